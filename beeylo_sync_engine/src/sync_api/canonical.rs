//! Translation of storefront payloads into canonical records.
//!
//! Only a missing primary key is fatal. Every other malformed or missing field is replaced by a default, so one bad
//! field never costs us the whole order.
use beeylo_common::{Money, DEFAULT_CURRENCY_CODE};
use log::*;
use serde_json::Value;
use shopify_tools::{
    helpers::{value_as_i64, ShopifyId},
    Address,
    LineItem,
    ShopifyCustomer,
    ShopifyFulfillment,
    ShopifyOrder,
};

use crate::{
    db_types::{NewCustomer, NewFulfillment, NewOrder, OrderLineItem, ShipmentStatus},
    sync_api::errors::SyncError,
};

/// The cart attribute the storefront script sets when a shopper asks for delivery through the Beeylo app.
pub const RECEIVE_IN_APP_ATTRIBUTE: &str = "Receive_in_Beeylo_App";
/// The only value of [`RECEIVE_IN_APP_ATTRIBUTE`] that opts in. The storefront script writes exactly this.
pub const RECEIVE_IN_APP_YES: &str = "Yes";
/// Line item property carrying the product image.
pub const IMAGE_URL_PROPERTY: &str = "_image_url";

/// Reads the app-delivery preference from the order's note attributes. Anything but an exact "Yes" means no.
pub fn receive_in_app(order: &ShopifyOrder) -> bool {
    order.note_attribute(RECEIVE_IN_APP_ATTRIBUTE).is_some_and(|v| v == RECEIVE_IN_APP_YES)
}

/// Reads a decimal amount that may arrive as a string or a number.
pub fn money_from_value(value: &Value) -> Option<Money> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64().and_then(|f| Money::from_f64(f).ok()),
        _ => None,
    }
}

fn id_string(id: &Option<ShopifyId>) -> Option<String> {
    id.as_ref().map(ShopifyId::to_string)
}

fn address_value(address: &Option<Address>) -> Option<Value> {
    address.as_ref().and_then(|a| serde_json::to_value(a).ok())
}

pub fn line_item(item: &LineItem) -> OrderLineItem {
    let quantity = item.quantity.as_ref().and_then(value_as_i64).unwrap_or_else(|| {
        if item.quantity.is_some() {
            warn!("🔄️ Line item {:?} has an unreadable quantity. Using 0.", item.id);
        }
        0
    });
    let price = item.price.as_ref().and_then(money_from_value).unwrap_or_else(|| {
        if item.price.is_some() {
            warn!("🔄️ Line item {:?} has an unreadable price. Using 0.", item.id);
        }
        Money::default()
    });
    OrderLineItem {
        id: id_string(&item.id),
        product_id: id_string(&item.product_id),
        variant_id: id_string(&item.variant_id),
        title: item.title.clone().or_else(|| item.name.clone()).unwrap_or_default(),
        quantity,
        price,
        sku: item.sku.clone(),
        vendor: item.vendor.clone(),
        fulfillment_status: item.fulfillment_status.clone(),
        fulfillment_service: item.fulfillment_service.clone(),
        product_exists: item.product_exists.unwrap_or(true),
        image_url: item.property(IMAGE_URL_PROPERTY),
    }
}

pub fn line_items(items: &[LineItem]) -> Vec<OrderLineItem> {
    items.iter().map(line_item).collect()
}

/// Builds the canonical order. The total is the storefront's own total when it can be read, and otherwise the sum of
/// the line items.
pub fn new_order(
    store_id: i64,
    order: &ShopifyOrder,
    customer_id: Option<i64>,
    receive_in_app: bool,
) -> Result<NewOrder, SyncError> {
    let shopify_order_id = id_string(&order.id).ok_or(SyncError::MissingPrimaryKey("order"))?;
    let line_items = line_items(&order.line_items);
    let total_price = order
        .total_price
        .as_ref()
        .or(order.current_total_price.as_ref())
        .and_then(money_from_value)
        .unwrap_or_else(|| line_items.iter().map(OrderLineItem::subtotal).sum());
    Ok(NewOrder {
        store_id,
        shopify_order_id,
        order_number: order.display_name(),
        customer_id,
        email: order.email.clone(),
        phone: order.phone.clone(),
        financial_status: order.financial_status.clone(),
        fulfillment_status: order.fulfillment_status.clone(),
        total_price,
        currency: order.currency.clone().unwrap_or_else(|| DEFAULT_CURRENCY_CODE.to_string()),
        line_items,
        shipping_address: address_value(&order.shipping_address),
        billing_address: address_value(&order.billing_address),
        receive_in_app,
        created_at: order.created_at,
        updated_at: order.updated_at,
        cancelled_at: order.cancelled_at,
    })
}

pub fn new_customer(store_id: i64, customer: &ShopifyCustomer) -> Result<NewCustomer, SyncError> {
    let shopify_customer_id = id_string(&customer.id).ok_or(SyncError::MissingPrimaryKey("customer"))?;
    Ok(NewCustomer {
        store_id,
        shopify_customer_id,
        email: customer.email.clone().filter(|e| !e.trim().is_empty()),
        phone: customer.phone.clone(),
        first_name: customer.first_name.clone(),
        last_name: customer.last_name.clone(),
        orders_count: customer.orders_count.as_ref().and_then(value_as_i64).unwrap_or_default(),
        total_spent: customer.total_spent.as_ref().and_then(money_from_value).unwrap_or_default(),
        verified_email: customer.verified_email.unwrap_or_default(),
        tax_exempt: customer.tax_exempt.unwrap_or_default(),
        tags: customer.tag_list(),
    })
}

pub fn new_fulfillment(order_id: i64, fulfillment: &ShopifyFulfillment) -> Result<NewFulfillment, SyncError> {
    let shopify_fulfillment_id = id_string(&fulfillment.id).ok_or(SyncError::MissingPrimaryKey("fulfillment"))?;
    Ok(NewFulfillment {
        order_id,
        shopify_fulfillment_id,
        status: fulfillment.status.clone(),
        tracking_company: fulfillment.tracking_company.clone().filter(|c| !c.trim().is_empty()),
        tracking_number: fulfillment.primary_tracking_number(),
        tracking_url: fulfillment.tracking_url.clone(),
        shipment_status: fulfillment.shipment_status.as_deref().map(ShipmentStatus::from_shopify),
        line_items: line_items(&fulfillment.line_items),
        created_at: fulfillment.created_at,
        updated_at: fulfillment.updated_at,
    })
}

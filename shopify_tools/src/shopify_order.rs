use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    helpers::{lenient_id, lenient_timestamp, null_as_default, value_as_string, ShopifyId},
    ShopifyCustomer,
    ShopifyFulfillment,
};

/// An order as delivered by the `orders/*` webhooks and the Admin REST API.
///
/// Only the fields the sync engine reads are modelled. Every field is optional so that a sparse or partially
/// malformed payload still deserializes; the sync engine decides which absences are fatal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShopifyOrder {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<ShopifyId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub order_number: Option<ShopifyId>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub financial_status: Option<String>,
    #[serde(default)]
    pub fulfillment_status: Option<String>,
    #[serde(default)]
    pub total_price: Option<Value>,
    #[serde(default)]
    pub current_total_price: Option<Value>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub line_items: Vec<LineItem>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub note_attributes: Vec<NoteAttribute>,
    #[serde(default)]
    pub customer: Option<ShopifyCustomer>,
    #[serde(default)]
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fulfillments: Vec<ShopifyFulfillment>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl ShopifyOrder {
    /// Returns the value of the note attribute with the given name, if it is present and a scalar.
    pub fn note_attribute(&self, name: &str) -> Option<String> {
        self.note_attributes.iter().find(|a| a.name == name).and_then(|a| a.value.as_ref()).and_then(value_as_string)
    }

    /// The human-readable order reference, e.g. "#1001".
    pub fn display_name(&self) -> Option<String> {
        self.name.clone().or_else(|| self.order_number.as_ref().map(|n| format!("#{n}")))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<ShopifyId>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub product_id: Option<ShopifyId>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub variant_id: Option<ShopifyId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub quantity: Option<Value>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub fulfillment_status: Option<String>,
    #[serde(default)]
    pub fulfillment_service: Option<String>,
    #[serde(default)]
    pub product_exists: Option<bool>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub properties: Vec<NoteAttribute>,
}

impl LineItem {
    pub fn property(&self, name: &str) -> Option<String> {
        self.properties.iter().find(|a| a.name == name).and_then(|a| a.value.as_ref()).and_then(value_as_string)
    }
}

/// A name/value pair, used both for order `note_attributes` and line item `properties`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoteAttribute {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub address1: Option<String>,
    #[serde(default)]
    pub address2: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub province: Option<String>,
    #[serde(default)]
    pub zip: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

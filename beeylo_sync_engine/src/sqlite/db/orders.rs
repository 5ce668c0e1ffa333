use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewOrder, Order},
    traits::StoreError,
};

/// Upserts the order on `(store_id, shopify_order_id)`, with last-write-wins on every other column.
///
/// The one exception is `customer_id`: a sync that could not resolve the customer does not erase a link made by an
/// earlier sync.
pub async fn upsert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, StoreError> {
    let line_items = serde_json::to_string(&order.line_items)?;
    let order: Order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                store_id,
                shopify_order_id,
                order_number,
                customer_id,
                email,
                phone,
                financial_status,
                fulfillment_status,
                total_price,
                currency,
                line_items,
                shipping_address,
                billing_address,
                receive_in_app,
                created_at,
                updated_at,
                cancelled_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (store_id, shopify_order_id) DO UPDATE SET
                order_number = excluded.order_number,
                customer_id = COALESCE(excluded.customer_id, orders.customer_id),
                email = excluded.email,
                phone = excluded.phone,
                financial_status = excluded.financial_status,
                fulfillment_status = excluded.fulfillment_status,
                total_price = excluded.total_price,
                currency = excluded.currency,
                line_items = excluded.line_items,
                shipping_address = excluded.shipping_address,
                billing_address = excluded.billing_address,
                receive_in_app = excluded.receive_in_app,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                cancelled_at = excluded.cancelled_at
            RETURNING *;
        "#,
    )
    .bind(order.store_id)
    .bind(order.shopify_order_id)
    .bind(order.order_number)
    .bind(order.customer_id)
    .bind(order.email)
    .bind(order.phone)
    .bind(order.financial_status)
    .bind(order.fulfillment_status)
    .bind(order.total_price)
    .bind(order.currency)
    .bind(line_items)
    .bind(order.shipping_address.map(|v| v.to_string()))
    .bind(order.billing_address.map(|v| v.to_string()))
    .bind(order.receive_in_app)
    .bind(order.created_at)
    .bind(order.updated_at)
    .bind(order.cancelled_at)
    .fetch_all(conn)
    .await?
    .into_iter()
    .next()
    .ok_or(sqlx::Error::RowNotFound)?;
    debug!("🗃️ Order {} upserted with id {}", order.shopify_order_id, order.id);
    Ok(order)
}

pub async fn fetch_order(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_order_by_shopify_id(
    store_id: i64,
    shopify_order_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM orders WHERE store_id = $1 AND shopify_order_id = $2")
        .bind(store_id)
        .bind(shopify_order_id)
        .fetch_optional(conn)
        .await
}

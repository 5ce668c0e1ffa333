use chrono::{DateTime, Utc};
use log::debug;
use sqlx::{sqlite::SqliteRow, FromRow, Row, SqliteConnection};

use crate::{
    db_types::{Fulfillment, FulfillmentTrackingUpdate, NewFulfillment},
    traits::{ShipmentToCheck, StoreError},
};

/// Upserts on `(order_id, shopify_fulfillment_id)`.
///
/// The storefront does not know about courier lookups, so delivery estimates and the last-checked time are left
/// alone, and an absent `shipment_status` does not overwrite one obtained from a courier.
pub async fn upsert_fulfillment(
    fulfillment: NewFulfillment,
    conn: &mut SqliteConnection,
) -> Result<Fulfillment, StoreError> {
    let line_items = serde_json::to_string(&fulfillment.line_items)?;
    let fulfillment: Fulfillment = sqlx::query_as(
        r#"
            INSERT INTO fulfillments (
                order_id,
                shopify_fulfillment_id,
                status,
                tracking_company,
                tracking_number,
                tracking_url,
                shipment_status,
                line_items,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (order_id, shopify_fulfillment_id) DO UPDATE SET
                status = excluded.status,
                tracking_company = excluded.tracking_company,
                tracking_number = excluded.tracking_number,
                tracking_url = excluded.tracking_url,
                shipment_status = COALESCE(excluded.shipment_status, fulfillments.shipment_status),
                line_items = excluded.line_items,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            RETURNING *;
        "#,
    )
    .bind(fulfillment.order_id)
    .bind(fulfillment.shopify_fulfillment_id)
    .bind(fulfillment.status)
    .bind(fulfillment.tracking_company)
    .bind(fulfillment.tracking_number)
    .bind(fulfillment.tracking_url)
    .bind(fulfillment.shipment_status)
    .bind(line_items)
    .bind(fulfillment.created_at)
    .bind(fulfillment.updated_at)
    .fetch_all(conn)
    .await?
    .into_iter()
    .next()
    .ok_or(sqlx::Error::RowNotFound)?;
    debug!("🗃️ Fulfillment {} upserted with id {}", fulfillment.shopify_fulfillment_id, fulfillment.id);
    Ok(fulfillment)
}

pub async fn fetch_fulfillment(id: i64, conn: &mut SqliteConnection) -> Result<Option<Fulfillment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM fulfillments WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_fulfillments_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Fulfillment>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM fulfillments WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await
}

/// Applies a courier lookup result. Delivery times are only replaced when the lookup produced one.
pub async fn update_tracking(
    update: FulfillmentTrackingUpdate,
    conn: &mut SqliteConnection,
) -> Result<Fulfillment, StoreError> {
    let fulfillment = sqlx::query_as(
        r#"
            UPDATE fulfillments SET
                shipment_status = $1,
                estimated_delivery = COALESCE($2, estimated_delivery),
                actual_delivery = COALESCE($3, actual_delivery),
                tracking_checked_at = $4
            WHERE id = $5
            RETURNING *;
        "#,
    )
    .bind(update.shipment_status)
    .bind(update.estimated_delivery)
    .bind(update.actual_delivery)
    .bind(update.checked_at)
    .bind(update.fulfillment_id)
    .fetch_all(conn)
    .await?
    .into_iter()
    .next()
    .ok_or_else(|| StoreError::NotFound(format!("Fulfillment {}", update.fulfillment_id)))?;
    Ok(fulfillment)
}

pub async fn mark_checked(
    fulfillment_id: i64,
    checked_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE fulfillments SET tracking_checked_at = $1 WHERE id = $2")
        .bind(checked_at)
        .bind(fulfillment_id)
        .execute(conn)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("Fulfillment {fulfillment_id}")));
    }
    Ok(())
}

/// Shipments due for another lookup. Never-checked shipments come first, then the least recently checked.
pub async fn fetch_shipments_to_check(
    checked_before: DateTime<Utc>,
    limit: u32,
    conn: &mut SqliteConnection,
) -> Result<Vec<ShipmentToCheck>, sqlx::Error> {
    let rows: Vec<SqliteRow> = sqlx::query(
        r#"
            SELECT f.*, o.store_id AS store_id FROM fulfillments f
            JOIN orders o ON o.id = f.order_id
            WHERE f.tracking_number IS NOT NULL AND TRIM(f.tracking_number) <> ''
              AND (f.shipment_status IS NULL
                   OR f.shipment_status NOT IN ('delivered', 'return_to_sender', 'cancelled'))
              AND (f.status IS NULL OR f.status NOT IN ('cancelled', 'error', 'failure'))
              AND (f.tracking_checked_at IS NULL OR f.tracking_checked_at < $1)
            ORDER BY f.tracking_checked_at ASC, f.id ASC
            LIMIT $2
        "#,
    )
    .bind(checked_before)
    .bind(i64::from(limit))
    .fetch_all(conn)
    .await?;
    rows.iter()
        .map(|row| Ok(ShipmentToCheck { store_id: row.try_get("store_id")?, fulfillment: Fulfillment::from_row(row)? }))
        .collect()
}

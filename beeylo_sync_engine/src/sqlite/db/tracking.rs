use sqlx::SqliteConnection;

use crate::{
    db_types::{NewTrackingEvent, TrackingEvent},
    traits::StoreError,
};

// Missing locations are stored as '' so that the uniqueness constraint treats them as equal.
const EVENT_COLUMNS: &str =
    "id, fulfillment_id, courier, status, description, NULLIF(location, '') AS location, timestamp";

/// Appends the event, unless an identical one was stored before. Either way, the stored row is returned.
pub async fn insert_event(event: NewTrackingEvent, conn: &mut SqliteConnection) -> Result<TrackingEvent, StoreError> {
    let location = event.location.unwrap_or_default();
    sqlx::query(
        r#"
            INSERT INTO tracking_events (fulfillment_id, courier, status, description, location, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (fulfillment_id, timestamp, status, description, location) DO NOTHING;
        "#,
    )
    .bind(event.fulfillment_id)
    .bind(&event.courier)
    .bind(event.status)
    .bind(&event.description)
    .bind(&location)
    .bind(event.timestamp)
    .execute(&mut *conn)
    .await?;
    let q = format!(
        "SELECT {EVENT_COLUMNS} FROM tracking_events WHERE fulfillment_id = $1 AND timestamp = $2 AND status = $3 AND \
         description = $4 AND location = $5"
    );
    let stored = sqlx::query_as(&q)
        .bind(event.fulfillment_id)
        .bind(event.timestamp)
        .bind(event.status)
        .bind(&event.description)
        .bind(&location)
        .fetch_all(conn)
        .await?
        .into_iter()
        .next()
        .ok_or(sqlx::Error::RowNotFound)?;
    Ok(stored)
}

pub async fn fetch_events_for_fulfillment(
    fulfillment_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<TrackingEvent>, sqlx::Error> {
    let q = format!("SELECT {EVENT_COLUMNS} FROM tracking_events WHERE fulfillment_id = $1 ORDER BY timestamp ASC");
    sqlx::query_as(&q).bind(fulfillment_id).fetch_all(conn).await
}

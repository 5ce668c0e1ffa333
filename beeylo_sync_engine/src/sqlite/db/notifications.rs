use chrono::Utc;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewNotification, Notification},
    traits::StoreError,
};

/// Inserts the notification, unless one with the same dedupe key already exists. Returns the stored notification and
/// `true` if it was inserted by this call.
pub async fn idempotent_insert(
    notification: NewNotification,
    conn: &mut SqliteConnection,
) -> Result<(Notification, bool), StoreError> {
    let inserted: Option<Notification> = sqlx::query_as(
        r#"
            INSERT INTO notifications (
                order_id,
                customer_id,
                user_id,
                notification_type,
                channel,
                title,
                message,
                payload,
                template_id,
                dedupe_key,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (dedupe_key) DO NOTHING
            RETURNING *;
        "#,
    )
    .bind(notification.order_id)
    .bind(notification.customer_id)
    .bind(notification.user_id)
    .bind(notification.notification_type)
    .bind(notification.channel)
    .bind(notification.title)
    .bind(notification.message)
    .bind(notification.payload.to_string())
    .bind(notification.template_id)
    .bind(&notification.dedupe_key)
    .bind(Utc::now())
    .fetch_all(&mut *conn)
    .await?
    .into_iter()
    .next();
    match inserted {
        Some(n) => {
            debug!("🗃️ Notification {} created with id {}", n.dedupe_key, n.id);
            Ok((n, true))
        },
        None => {
            let existing = sqlx::query_as("SELECT * FROM notifications WHERE dedupe_key = $1")
                .bind(&notification.dedupe_key)
                .fetch_all(conn)
                .await?
                .into_iter()
                .next()
                .ok_or(sqlx::Error::RowNotFound)?;
            Ok((existing, false))
        },
    }
}

pub async fn mark_sent(id: i64, conn: &mut SqliteConnection) -> Result<Notification, StoreError> {
    let notification =
        sqlx::query_as("UPDATE notifications SET sent = 1, sent_at = COALESCE(sent_at, $1) WHERE id = $2 RETURNING *")
            .bind(Utc::now())
            .bind(id)
            .fetch_all(conn)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::NotFound(format!("Notification {id}")))?;
    Ok(notification)
}

pub async fn fetch_pending(limit: u32, conn: &mut SqliteConnection) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM notifications WHERE sent = 0 ORDER BY created_at ASC, id ASC LIMIT $1")
        .bind(i64::from(limit))
        .fetch_all(conn)
        .await
}

pub async fn fetch_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Notification>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM notifications WHERE order_id = $1 ORDER BY id").bind(order_id).fetch_all(conn).await
}

pub async fn insert_inbox_entry(notification: &Notification, conn: &mut SqliteConnection) -> Result<(), StoreError> {
    sqlx::query(
        r#"
            INSERT INTO inbox_entries (notification_id, user_id, order_id, channel, title, message, payload, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (notification_id) DO NOTHING;
        "#,
    )
    .bind(notification.id)
    .bind(notification.user_id)
    .bind(notification.order_id)
    .bind(notification.channel)
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(notification.payload.to_string())
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}

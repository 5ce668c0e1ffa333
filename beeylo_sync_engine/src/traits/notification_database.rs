use async_trait::async_trait;

use crate::{
    db_types::{NewNotification, Notification},
    traits::StoreError,
};

#[async_trait]
pub trait NotificationDatabase: Clone + Send + Sync + 'static {
    /// Creates the notification unless one with the same dedupe key exists. Returns the stored notification and
    /// whether it was created by this call.
    async fn create_notification(&self, notification: NewNotification) -> Result<(Notification, bool), StoreError>;

    /// Marks the notification as sent. Marking a sent notification again leaves the original `sent_at` in place.
    async fn mark_notification_sent(&self, id: i64) -> Result<Notification, StoreError>;

    /// The oldest unsent notifications, up to `limit`.
    async fn fetch_pending_notifications(&self, limit: u32) -> Result<Vec<Notification>, StoreError>;

    async fn fetch_notifications_for_order(&self, order_id: i64) -> Result<Vec<Notification>, StoreError>;

    /// Records the notification in the recipient's app inbox. Recording the same notification twice is a no-op.
    async fn record_inbox_entry(&self, notification: &Notification) -> Result<(), StoreError>;
}

use crate::db_types::{Notification, Order, Store};

/// A new order opted in to delivery through the Beeylo app.
#[derive(Debug, Clone)]
pub struct AppDeliveryOrderEvent {
    pub store: Store,
    pub order: Order,
}

impl AppDeliveryOrderEvent {
    pub fn new(store: Store, order: Order) -> Self {
        Self { store, order }
    }
}

/// A notification was dispatched to the recipient's inbox. Push delivery hangs off this.
#[derive(Debug, Clone)]
pub struct NotificationSentEvent {
    pub notification: Notification,
}

impl NotificationSentEvent {
    pub fn new(notification: Notification) -> Self {
        Self { notification }
    }
}

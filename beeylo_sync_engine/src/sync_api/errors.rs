use thiserror::Error;

use crate::{
    couriers::CourierError,
    traits::{QueueError, StoreError, StorefrontError},
};

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("The {0} payload has no id")]
    MissingPrimaryKey(&'static str),
    #[error("{0} was not found")]
    NotFound(String),
    #[error("The payload could not be read: {0}")]
    InvalidPayload(String),
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Queue(#[from] QueueError),
    #[error("{0}")]
    Storefront(#[from] StorefrontError),
}

#[derive(Debug, Clone, Error)]
pub enum NotificationError {
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("Notification could not be delivered: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, Error)]
pub enum TrackingError {
    #[error("Fulfillment {0} was not found")]
    FulfillmentNotFound(i64),
    #[error("{0}")]
    Courier(#[from] CourierError),
    #[error("{0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Queue(#[from] QueueError),
}

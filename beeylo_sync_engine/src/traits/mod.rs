//! Backend-agnostic interfaces to the state store and the job broker.
//!
//! The sync engine's APIs are generic over these traits, so any backend that implements them can be plugged in.
//! [`crate::SqliteDatabase`] implements all of them.
mod job_broker;
mod notification_database;
mod storefront;
mod sync_database;
mod tracking_database;

pub use job_broker::{JobBroker, QueueError};
pub use notification_database::NotificationDatabase;
pub use storefront::{ShopifyStorefront, StorefrontApi, StorefrontError};
pub use sync_database::SyncDatabase;
pub use tracking_database::{ShipmentToCheck, TrackingDatabase};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("{0} was not found")]
    NotFound(String),
    #[error("Conflicting record: {0}")]
    Conflict(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound("Row".to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => Self::Conflict(db.message().to_string()),
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                Self::InvalidRecord(db.message().to_string())
            },
            _ => Self::DatabaseError(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::InvalidRecord(e.to_string())
    }
}

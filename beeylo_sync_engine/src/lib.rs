//! Beeylo Sync Engine
//!
//! The sync engine keeps Beeylo's copy of a merchant's Shopify orders, customers and shipments up to date, and tells
//! shoppers what is happening to their orders. It is storefront-facing only through payload types and a small
//! [`traits::StorefrontApi`], so the HTTP surface lives elsewhere.
//!
//! The library is divided into these sections:
//! 1. State and queue storage ([`mod@traits`], [`mod@db_types`]). The APIs are generic over the traits; SQLite is the
//!    supported backend.
//! 2. The job queue ([`mod@queue`]). Webhooks are persisted as jobs before they are acknowledged, and drained by the
//!    worker pools in [`mod@workers`].
//! 3. The sync APIs ([`mod@sync_api`]): canonical upserts, notification decisions and dispatch, tracking lookups, and
//!    the per-topic webhook processor.
//! 4. Courier tracking ([`mod@couriers`]) behind the keyed [`mod@rate_limiter`].
//!
//! The engine also publishes events that a host can hook into (see [`mod@events`]), for example to tag app-delivery
//! orders in Shopify or to push a sent notification to a phone.
pub mod couriers;
pub mod db_types;
pub mod events;
pub mod helpers;
pub mod queue;
pub mod rate_limiter;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod sync_api;
pub mod traits;
pub mod workers;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use sync_api::{
    ManualSyncSummary,
    NotificationApi,
    NotificationError,
    SyncApi,
    SyncError,
    TrackingApi,
    TrackingError,
    WebhookProcessor,
};

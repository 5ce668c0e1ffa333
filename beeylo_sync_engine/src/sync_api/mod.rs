//! The APIs that turn storefront events into canonical state, notifications, and tracking lookups.
pub mod canonical;
mod errors;
mod notification_api;
#[allow(clippy::module_inception)]
mod sync_api;
mod tracking_api;
mod webhook_processor;

pub use errors::{NotificationError, SyncError, TrackingError};
pub use notification_api::{
    channels_for,
    dedupe_key,
    InboxSink,
    NotificationApi,
    NotificationSink,
    OrderEvent,
    SweepSummary,
    DEFAULT_SWEEP_BATCH,
};
pub use sync_api::{LinkSummary, SyncApi, SyncedOrder};
pub use tracking_api::{tracking_job_for, TrackingApi, TrackingOutcome, RECHECK_AFTER, RECHECK_BATCH};
pub use webhook_processor::{ManualSyncSummary, WebhookOutcome, WebhookProcessor, MANUAL_SYNC_PAGE_SIZE};

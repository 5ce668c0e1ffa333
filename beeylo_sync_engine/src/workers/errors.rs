use std::time::Duration;

use thiserror::Error;

use crate::{
    couriers::CourierError,
    sync_api::{SyncError, TrackingError},
    traits::{QueueError, StoreError, StorefrontError},
};

/// How a failed job should be settled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// Retrying cannot help. The job is logged and completed.
    #[error("{0}")]
    Terminal(String),
    /// Retrying cannot help, but an operator should look at the job.
    #[error("{0}")]
    DeadLetter(String),
    /// Retry with backoff, unless the job is out of attempts.
    #[error("{reason}")]
    Transient { reason: String, retry_after: Option<Duration> },
}

impl JobError {
    pub fn transient<S: Into<String>>(reason: S) -> Self {
        Self::Transient { reason: reason.into(), retry_after: None }
    }
}

impl From<StoreError> for JobError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => Self::Terminal(e.to_string()),
            _ => Self::transient(e.to_string()),
        }
    }
}

impl From<QueueError> for JobError {
    fn from(e: QueueError) -> Self {
        Self::transient(e.to_string())
    }
}

impl From<CourierError> for JobError {
    fn from(e: CourierError) -> Self {
        match e {
            CourierError::NotFound(_) | CourierError::NotConfigured(_) => Self::Terminal(e.to_string()),
            CourierError::Auth(_) => Self::DeadLetter(e.to_string()),
            CourierError::RateLimited(_) | CourierError::Upstream(_) | CourierError::InvalidResponse(_) => {
                Self::transient(e.to_string())
            },
        }
    }
}

impl From<SyncError> for JobError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::MissingPrimaryKey(_) | SyncError::NotFound(_) | SyncError::InvalidPayload(_) => {
                Self::Terminal(e.to_string())
            },
            SyncError::Store(e) => e.into(),
            SyncError::Queue(e) => e.into(),
            SyncError::Storefront(StorefrontError::Transient(m)) => Self::transient(m),
            SyncError::Storefront(StorefrontError::Failed(m)) => Self::Terminal(m),
        }
    }
}

impl From<TrackingError> for JobError {
    fn from(e: TrackingError) -> Self {
        match e {
            TrackingError::FulfillmentNotFound(_) => Self::Terminal(e.to_string()),
            TrackingError::Courier(e) => e.into(),
            TrackingError::Store(e) => e.into(),
            TrackingError::Queue(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn courier_errors() {
        assert!(matches!(JobError::from(CourierError::NotFound("x".into())), JobError::Terminal(_)));
        assert!(matches!(JobError::from(CourierError::Auth("x".into())), JobError::DeadLetter(_)));
        assert!(matches!(JobError::from(CourierError::Upstream("x".into())), JobError::Transient { .. }));
        let tracking = TrackingError::Courier(CourierError::InvalidResponse("x".into()));
        assert!(matches!(JobError::from(tracking), JobError::Transient { retry_after: None, .. }));
    }

    #[test]
    fn sync_errors() {
        assert!(matches!(JobError::from(SyncError::MissingPrimaryKey("order")), JobError::Terminal(_)));
        assert!(matches!(JobError::from(SyncError::NotFound("Order 1".into())), JobError::Terminal(_)));
        let db = SyncError::Store(StoreError::DatabaseError("locked".into()));
        assert!(matches!(JobError::from(db), JobError::Transient { .. }));
        let throttled = SyncError::Storefront(StorefrontError::Transient("429".into()));
        assert!(matches!(JobError::from(throttled), JobError::Transient { .. }));
    }
}

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    db_types::{JobRecord, NewJob, QueueName},
    traits::StoreError,
};

#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("Job broker error: {0}")]
    BrokerError(String),
    #[error("Job {0} does not exist")]
    JobNotFound(i64),
    #[error("Could not (de)serialize job payload: {0}")]
    PayloadError(String),
}

impl From<StoreError> for QueueError {
    fn from(e: StoreError) -> Self {
        Self::BrokerError(e.to_string())
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::JobNotFound(-1),
            e => Self::BrokerError(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(e: serde_json::Error) -> Self {
        Self::PayloadError(e.to_string())
    }
}

/// Durable storage for queued jobs. All times are unix epoch milliseconds.
///
/// A claimed job is leased until `lease_until`; if the worker holding it dies, the job becomes claimable again once
/// the lease expires. This is what makes queued jobs survive a process restart.
#[async_trait]
pub trait JobBroker: Clone + Send + Sync + 'static {
    async fn push_job(&self, job: NewJob) -> Result<i64, QueueError>;

    /// Atomically claims the next available job: the lowest priority value first, then the earliest enqueued.
    /// The job's attempt counter is incremented.
    async fn claim_next_job(&self, queue: QueueName, now: i64, lease_until: i64)
        -> Result<Option<JobRecord>, QueueError>;

    /// The earliest time at which a pending job on the queue becomes available, if there are any.
    async fn next_available_at(&self, queue: QueueName) -> Result<Option<i64>, QueueError>;

    async fn complete_job(&self, id: i64, now: i64) -> Result<(), QueueError>;

    async fn reschedule_job(&self, id: i64, available_at: i64, error: &str) -> Result<(), QueueError>;

    async fn dead_letter_job(&self, id: i64, now: i64, error: &str) -> Result<(), QueueError>;

    async fn fetch_job(&self, id: i64) -> Result<Option<JobRecord>, QueueError>;

    /// Dead-lettered jobs, most recent first.
    async fn fetch_dead_letters(&self, queue: QueueName, limit: u32) -> Result<Vec<JobRecord>, QueueError>;

    /// Deletes completed jobs finished before `completed_before`, and dead letters finished before `dead_before`.
    async fn purge_jobs(&self, queue: QueueName, completed_before: i64, dead_before: i64) -> Result<u64, QueueError>;
}

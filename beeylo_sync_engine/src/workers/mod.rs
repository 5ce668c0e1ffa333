//! Worker pools that drain the job queues.
//!
//! Each queue gets its own pool of workers. A worker claims one job at a time, runs it to completion, and settles it
//! according to the [`JobError`] its handler returns.
mod errors;
mod handlers;
mod pool;

use async_trait::async_trait;
pub use errors::JobError;
pub use handlers::{TrackingJobHandler, WebhookJobHandler};
pub use pool::{settle, Settlement, WorkerPool};

use crate::queue::{ClaimedJob, JobPayload};

#[async_trait]
pub trait JobHandler<P: JobPayload>: Send + Sync + 'static {
    async fn handle(&self, job: &ClaimedJob<P>) -> Result<(), JobError>;
}

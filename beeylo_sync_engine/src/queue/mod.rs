//! The durable job queue sitting between webhook ingress and the workers.
//!
//! Jobs are persisted by a [`crate::traits::JobBroker`] before the webhook is acknowledged, and survive a restart.
//! Each queue has its own [`RetryPolicy`]: a failed job is retried with exponential backoff until it runs out of
//! attempts, after which it is moved to the dead-letter state and kept around for inspection.
mod job_queue;
mod jobs;
mod retry;

pub use job_queue::{ClaimedJob, EnqueueOptions, JobQueue, NackOutcome, QueueConfig};
pub use jobs::{JobPayload, Topic, TrackingJob, WebhookJob};
pub use retry::RetryPolicy;

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use log::*;
use tokio::{sync::Notify, time::sleep};

use super::{jobs::JobPayload, retry::RetryPolicy};
use crate::{
    db_types::{JobRecord, NewJob, QueueName},
    traits::{JobBroker, QueueError},
};

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub webhooks: RetryPolicy,
    pub tracking: RetryPolicy,
    /// How long a claimed job stays invisible to other workers. A worker that dies mid-job releases it when the lease
    /// expires.
    pub lease: Duration,
    /// The longest a waiting worker sleeps before checking the broker again.
    pub poll_interval: Duration,
    pub completed_retention: Duration,
    pub dead_letter_retention: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            webhooks: RetryPolicy::webhooks(),
            tracking: RetryPolicy::tracking(),
            lease: Duration::from_secs(5 * 60),
            poll_interval: Duration::from_secs(1),
            completed_retention: Duration::from_secs(60 * 60),
            dead_letter_retention: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl QueueConfig {
    pub fn policy(&self, queue: QueueName) -> &RetryPolicy {
        match queue {
            QueueName::Webhooks => &self.webhooks,
            QueueName::Tracking => &self.tracking,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Overrides the payload's own priority.
    pub priority: Option<i64>,
    /// Overrides the queue's initial delay.
    pub delay: Option<Duration>,
}

impl EnqueueOptions {
    pub fn immediately() -> Self {
        Self { priority: None, delay: Some(Duration::ZERO) }
    }
}

/// A job claimed by a worker, with its payload decoded.
#[derive(Debug, Clone)]
pub struct ClaimedJob<P> {
    pub record: JobRecord,
    pub payload: P,
}

impl<P> ClaimedJob<P> {
    pub fn id(&self) -> i64 {
        self.record.id
    }

    pub fn attempt(&self) -> u32 {
        self.record.attempts
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    Retrying { after: Duration },
    DeadLettered,
}

#[derive(Default)]
struct QueueSignals {
    webhooks: Notify,
    tracking: Notify,
}

impl QueueSignals {
    fn get(&self, queue: QueueName) -> &Notify {
        match queue {
            QueueName::Webhooks => &self.webhooks,
            QueueName::Tracking => &self.tracking,
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn as_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// The queue API used by the webhook endpoint, the sync engine and the workers.
#[derive(Clone)]
pub struct JobQueue<B> {
    broker: B,
    config: Arc<QueueConfig>,
    signals: Arc<QueueSignals>,
}

impl<B> JobQueue<B>
where B: JobBroker
{
    pub fn new(broker: B, config: QueueConfig) -> Self {
        Self { broker, config: Arc::new(config), signals: Arc::new(QueueSignals::default()) }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn broker(&self) -> &B {
        &self.broker
    }

    pub async fn enqueue<P: JobPayload>(&self, payload: &P, options: EnqueueOptions) -> Result<i64, QueueError> {
        let policy = self.config.policy(P::QUEUE);
        let priority = options.priority.unwrap_or_else(|| payload.priority());
        let delay = options.delay.unwrap_or(policy.initial_delay);
        let now = now_ms();
        let job = NewJob {
            queue: P::QUEUE,
            payload: serde_json::to_string(payload)?,
            priority,
            max_attempts: policy.max_attempts,
            backoff_base_ms: as_ms(policy.backoff_base),
            enqueued_at: now,
            available_at: now.saturating_add(as_ms(delay)),
        };
        let id = self.broker.push_job(job).await?;
        debug!("📥️ Job {id} queued on {} with priority {priority}, available in {}ms", P::QUEUE, delay.as_millis());
        self.signals.get(P::QUEUE).notify_one();
        Ok(id)
    }

    /// Claims the next available job without waiting. Jobs whose payload cannot be decoded are dead-lettered.
    pub async fn try_dequeue<P: JobPayload>(&self) -> Result<Option<ClaimedJob<P>>, QueueError> {
        loop {
            let now = now_ms();
            let lease_until = now.saturating_add(as_ms(self.config.lease));
            let Some(record) = self.broker.claim_next_job(P::QUEUE, now, lease_until).await? else {
                return Ok(None);
            };
            match serde_json::from_str::<P>(&record.payload) {
                Ok(payload) => {
                    trace!("📥️ Job {} claimed from {} (attempt {})", record.id, P::QUEUE, record.attempts);
                    return Ok(Some(ClaimedJob { record, payload }));
                },
                Err(e) => {
                    error!("📥️ Job {} on {} has an invalid payload. Dead-lettering it. {e}", record.id, P::QUEUE);
                    self.broker.dead_letter_job(record.id, now, &format!("Invalid payload: {e}")).await?;
                },
            }
        }
    }

    /// Waits for the next available job.
    ///
    /// Between attempts the caller sleeps until the earliest scheduled job is due, or until something is enqueued,
    /// but never longer than the poll interval.
    pub async fn dequeue<P: JobPayload>(&self) -> Result<ClaimedJob<P>, QueueError> {
        let signal = self.signals.get(P::QUEUE);
        loop {
            let notified = signal.notified();
            if let Some(job) = self.try_dequeue::<P>().await? {
                return Ok(job);
            }
            let wait = match self.broker.next_available_at(P::QUEUE).await? {
                Some(at) => {
                    let ms = u64::try_from(at.saturating_sub(now_ms())).unwrap_or(0);
                    Duration::from_millis(ms).min(self.config.poll_interval)
                },
                None => self.config.poll_interval,
            };
            tokio::select! {
                _ = notified => {},
                _ = sleep(wait.max(Duration::from_millis(5))) => {},
            }
        }
    }

    pub async fn ack(&self, id: i64) -> Result<(), QueueError> {
        self.broker.complete_job(id, now_ms()).await?;
        trace!("📥️ Job {id} completed");
        Ok(())
    }

    /// Records a failed attempt. The job is retried after its backoff delay, or dead-lettered if it has used up all
    /// of its attempts.
    pub async fn nack(&self, job: &JobRecord, error: &str) -> Result<NackOutcome, QueueError> {
        self.nack_after(job, error, None).await
    }

    /// As [`Self::nack`], but `retry_after` overrides the computed backoff delay.
    pub async fn nack_after(
        &self,
        job: &JobRecord,
        error: &str,
        retry_after: Option<Duration>,
    ) -> Result<NackOutcome, QueueError> {
        if job.attempts >= job.max_attempts {
            self.dead_letter(job.id, error).await?;
            return Ok(NackOutcome::DeadLettered);
        }
        let policy = RetryPolicy {
            max_attempts: job.max_attempts,
            backoff_base: Duration::from_millis(u64::try_from(job.backoff_base_ms).unwrap_or(0)),
            ..*self.config.policy(job.queue)
        };
        let after = retry_after.unwrap_or_else(|| policy.backoff_for(job.attempts));
        self.broker.reschedule_job(job.id, now_ms().saturating_add(as_ms(after)), error).await?;
        info!(
            "📥️ Job {} failed on attempt {}/{}. Retrying in {}ms. {error}",
            job.id,
            job.attempts,
            job.max_attempts,
            after.as_millis()
        );
        Ok(NackOutcome::Retrying { after })
    }

    /// Moves the job straight to the dead-letter state, regardless of how many attempts it has left.
    pub async fn dead_letter(&self, id: i64, error: &str) -> Result<(), QueueError> {
        self.broker.dead_letter_job(id, now_ms(), error).await?;
        warn!("📥️ Job {id} moved to the dead-letter queue. {error}");
        Ok(())
    }

    pub async fn fetch_job(&self, id: i64) -> Result<Option<JobRecord>, QueueError> {
        self.broker.fetch_job(id).await
    }

    pub async fn dead_letters(&self, queue: QueueName, limit: u32) -> Result<Vec<JobRecord>, QueueError> {
        self.broker.fetch_dead_letters(queue, limit).await
    }

    /// Deletes finished jobs that are past their retention period, on every queue.
    pub async fn purge_finished(&self) -> Result<u64, QueueError> {
        let now = now_ms();
        let completed_before = now.saturating_sub(as_ms(self.config.completed_retention));
        let dead_before = now.saturating_sub(as_ms(self.config.dead_letter_retention));
        let mut total = 0;
        for queue in [QueueName::Webhooks, QueueName::Tracking] {
            total += self.broker.purge_jobs(queue, completed_before, dead_before).await?;
        }
        Ok(total)
    }
}

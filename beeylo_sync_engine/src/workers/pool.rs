use std::{sync::Arc, time::Duration};

use log::*;
use tokio::{sync::watch, task::JoinHandle, time::sleep};

use crate::{
    queue::{ClaimedJob, JobPayload, JobQueue, NackOutcome},
    rate_limiter::{LimiterKey, RateLimiter},
    traits::{JobBroker, QueueError},
    workers::{JobError, JobHandler},
};

/// How a job left the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Completed,
    /// Failed terminally. The job is completed so it is not retried.
    Dropped,
    Retrying { after: Duration },
    DeadLettered,
}

/// Records the outcome of a job with the queue.
pub async fn settle<B, P>(
    queue: &JobQueue<B>,
    job: &ClaimedJob<P>,
    result: Result<(), JobError>,
) -> Result<Settlement, QueueError>
where
    B: JobBroker,
    P: JobPayload,
{
    match result {
        Ok(()) => {
            queue.ack(job.id()).await?;
            Ok(Settlement::Completed)
        },
        Err(JobError::Terminal(reason)) => {
            warn!("👷️ Job {} on {} failed and will not be retried. {reason}", job.id(), P::QUEUE);
            queue.ack(job.id()).await?;
            Ok(Settlement::Dropped)
        },
        Err(JobError::DeadLetter(reason)) => {
            queue.dead_letter(job.id(), &reason).await?;
            Ok(Settlement::DeadLettered)
        },
        Err(JobError::Transient { reason, retry_after }) => {
            match queue.nack_after(&job.record, &reason, retry_after).await? {
                NackOutcome::Retrying { after } => Ok(Settlement::Retrying { after }),
                NackOutcome::DeadLettered => Ok(Settlement::DeadLettered),
            }
        },
    }
}

/// A fixed number of workers draining one queue.
pub struct WorkerPool {
    name: String,
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `concurrency` workers for the queue of `P`. Claims are paced by the queue's key in `limiter`.
    pub fn start<B, P, H>(concurrency: usize, queue: JobQueue<B>, handler: H, limiter: RateLimiter) -> Self
    where
        B: JobBroker,
        P: JobPayload,
        H: JobHandler<P>,
    {
        let (shutdown, rx) = watch::channel(false);
        let handler = Arc::new(handler);
        let workers = (1..=concurrency.max(1))
            .map(|id| {
                let worker = Worker { id, queue: queue.clone(), handler: Arc::clone(&handler), limiter: limiter.clone() };
                tokio::spawn(worker.run(rx.clone()))
            })
            .collect::<Vec<_>>();
        info!("👷️ Started {} workers on the {} queue", workers.len(), P::QUEUE);
        Self { name: P::QUEUE.to_string(), shutdown, workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Stops claiming new jobs and waits for the jobs in progress to finish.
    pub async fn shutdown(self) {
        info!("👷️ Stopping the {} workers", self.name);
        let _ = self.shutdown.send(true);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("👷️ A {} worker panicked. {e}", self.name);
            }
        }
    }
}

struct Worker<B, H> {
    id: usize,
    queue: JobQueue<B>,
    handler: Arc<H>,
    limiter: RateLimiter,
}

impl<B: JobBroker, H> Worker<B, H> {
    async fn run<P>(self, mut shutdown: watch::Receiver<bool>)
    where
        P: JobPayload,
        H: JobHandler<P>,
    {
        debug!("👷️ Worker {} on {} started", self.id, P::QUEUE);
        loop {
            if *shutdown.borrow() {
                break;
            }
            let claimed = tokio::select! {
                _ = shutdown.changed() => break,
                claimed = self.claim::<P>() => claimed,
            };
            let job = match claimed {
                Ok(job) => job,
                Err(e) => {
                    error!("👷️ Worker {} could not claim a job from {}. {e}", self.id, P::QUEUE);
                    sleep(self.queue.config().poll_interval).await;
                    continue;
                },
            };
            trace!("👷️ Worker {} running job {} (attempt {})", self.id, job.id(), job.attempt());
            let result = self.handler.handle(&job).await;
            match settle(&self.queue, &job, result).await {
                Ok(settlement) => trace!("👷️ Job {} settled: {settlement:?}", job.id()),
                Err(e) => error!("👷️ Job {} could not be settled. Its lease will expire and it will run again. {e}", job.id()),
            }
        }
        debug!("👷️ Worker {} on {} stopped", self.id, P::QUEUE);
    }

    /// Waits for the queue's ingress limiter, then claims a job. The lease only starts once the worker is free to run
    /// the job.
    async fn claim<P: JobPayload>(&self) -> Result<ClaimedJob<P>, QueueError> {
        match self.limiter.acquire(LimiterKey::Queue(P::QUEUE)).await {
            Ok(permit) => {
                let job = self.queue.dequeue::<P>().await;
                drop(permit);
                job
            },
            Err(e) => {
                warn!("👷️ Worker {} could not pace its next claim on {}. {e}", self.id, P::QUEUE);
                self.queue.dequeue::<P>().await
            },
        }
    }
}

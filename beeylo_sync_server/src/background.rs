//! Periodic housekeeping tasks. Do not await the returned handles, as the tasks run until the runtime shuts down.
use std::time::Duration;

use beeylo_sync_engine::{
    queue::JobQueue,
    rate_limiter::RateLimiter,
    sync_api::{DEFAULT_SWEEP_BATCH, RECHECK_AFTER, RECHECK_BATCH},
    traits::{JobBroker, NotificationDatabase, SyncDatabase, TrackingDatabase},
    NotificationApi,
    TrackingApi,
};
use chrono::Utc;
use log::*;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

fn timer(period: Duration) -> tokio::time::Interval {
    let mut timer = tokio::time::interval(period.max(Duration::from_secs(1)));
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

/// Retries notifications whose delivery failed.
pub fn start_notification_sweeper<B>(api: NotificationApi<B>, period: Duration) -> JoinHandle<()>
where B: SyncDatabase + NotificationDatabase {
    tokio::spawn(async move {
        let mut timer = timer(period);
        info!("🕰️ Notification sweeper started");
        loop {
            timer.tick().await;
            match api.sweep_pending(DEFAULT_SWEEP_BATCH).await {
                Ok(summary) if summary.pending > 0 => {
                    info!("🕰️ Notification sweep sent {} of {} pending notifications", summary.sent, summary.pending)
                },
                Ok(_) => trace!("🕰️ No pending notifications"),
                Err(e) => error!("🕰️ Error running the notification sweep: {e}"),
            }
        }
    })
}

/// Queues another tracking lookup for shipments in transit that have not been checked for a while.
pub fn start_shipment_rechecker<B>(api: TrackingApi<B>, queue: JobQueue<B>, period: Duration) -> JoinHandle<()>
where B: SyncDatabase + TrackingDatabase + NotificationDatabase + JobBroker {
    tokio::spawn(async move {
        let mut timer = timer(period);
        let recheck_after = chrono::Duration::from_std(RECHECK_AFTER).unwrap_or_else(|_| chrono::Duration::zero());
        info!("🕰️ Shipment recheck worker started");
        loop {
            timer.tick().await;
            let checked_before = Utc::now() - recheck_after;
            match api.recheck_active_shipments(&queue, checked_before, RECHECK_BATCH).await {
                Ok(n) => debug!("🕰️ Shipment recheck queued {n} lookups"),
                Err(e) => error!("🕰️ Error running the shipment recheck: {e}"),
            }
        }
    })
}

/// Deletes completed and dead-lettered jobs once they are past their retention period.
pub fn start_queue_purger<B: JobBroker>(queue: JobQueue<B>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = timer(period);
        info!("🕰️ Queue purge worker started");
        loop {
            timer.tick().await;
            match queue.purge_finished().await {
                Ok(0) => trace!("🕰️ No finished jobs to purge"),
                Ok(n) => info!("🕰️ Purged {n} finished jobs"),
                Err(e) => error!("🕰️ Error purging finished jobs: {e}"),
            }
        }
    })
}

/// Drops rate limiter state for keys that have been idle for longer than the limiter's idle TTL.
pub fn start_limiter_eviction(limiter: RateLimiter, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = timer(period);
        loop {
            timer.tick().await;
            let evicted = limiter.evict_idle();
            if evicted > 0 {
                debug!("🕰️ Evicted {evicted} idle rate limiters. {} remain.", limiter.active_keys());
            }
        }
    })
}

#[cfg(test)]
mod test {
    use beeylo_sync_engine::{
        queue::{EnqueueOptions, JobQueue, QueueConfig, TrackingJob},
        test_utils::prepare_env::{prepare_test_env, random_db_path},
    };

    use super::*;

    #[tokio::test]
    async fn purger_removes_expired_jobs() {
        let db = prepare_test_env(&random_db_path()).await;
        let config = QueueConfig { completed_retention: Duration::ZERO, ..QueueConfig::default() };
        let queue = JobQueue::new(db, config);
        let job = TrackingJob {
            store_id: 1,
            order_id: 1,
            fulfillment_id: 1,
            tracking_number: "3SABC123".into(),
            tracking_company: Some("PostNL".into()),
        };
        let id = queue.enqueue(&job, EnqueueOptions::immediately()).await.unwrap();
        let claimed = queue.try_dequeue::<TrackingJob>().await.unwrap().expect("job should be available");
        assert_eq!(claimed.id(), id);
        queue.ack(id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let handle = start_queue_purger(queue.clone(), Duration::from_secs(60));
        for _ in 0..100 {
            if queue.fetch_job(id).await.unwrap().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();
        assert!(queue.fetch_job(id).await.unwrap().is_none());
    }
}

use std::time::Duration;

use beeylo_sync_engine::{
    db_types::{JobStatus, NewJob, QueueName},
    queue::{EnqueueOptions, JobQueue, NackOutcome, QueueConfig, Topic, TrackingJob, WebhookJob},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::JobBroker,
    SqliteDatabase,
};
use chrono::Utc;

async fn queue_with(config: QueueConfig) -> JobQueue<SqliteDatabase> {
    let db = prepare_test_env(&random_db_path()).await;
    JobQueue::new(db, config)
}

fn webhook(topic: Topic, id: u64) -> WebhookJob {
    WebhookJob {
        store_id: 1,
        shop_domain: "a.myshopify.com".into(),
        topic,
        payload: serde_json::json!({ "id": id }),
        received_at: Utc::now(),
    }
}

fn tracking(n: i64) -> TrackingJob {
    TrackingJob {
        store_id: 1,
        order_id: n,
        fulfillment_id: n,
        tracking_number: format!("TN{n}"),
        tracking_company: Some("DHL".into()),
    }
}

#[tokio::test]
async fn lower_priority_first_then_fifo() -> anyhow::Result<()> {
    let queue = queue_with(QueueConfig::default()).await;
    queue.enqueue(&webhook(Topic::CustomersUpdate, 1), EnqueueOptions::default()).await?;
    queue.enqueue(&webhook(Topic::FulfillmentsUpdate, 2), EnqueueOptions::default()).await?;
    queue.enqueue(&webhook(Topic::OrdersCreate, 3), EnqueueOptions::default()).await?;
    queue.enqueue(&webhook(Topic::OrdersCreate, 4), EnqueueOptions::default()).await?;
    queue.enqueue(&webhook(Topic::FulfillmentsCreate, 5), EnqueueOptions::default()).await?;
    let mut order = Vec::new();
    while let Some(job) = queue.try_dequeue::<WebhookJob>().await? {
        order.push(job.payload.payload["id"].as_u64().unwrap_or_default());
        queue.ack(job.id()).await?;
    }
    assert_eq!(order, vec![3, 4, 5, 2, 1]);
    Ok(())
}

#[tokio::test]
async fn tracking_jobs_wait_out_the_grace_period() -> anyhow::Result<()> {
    let queue = queue_with(QueueConfig::default()).await;
    let id = queue.enqueue(&tracking(1), EnqueueOptions::default()).await?;
    assert!(queue.try_dequeue::<TrackingJob>().await?.is_none());
    let record = queue.fetch_job(id).await?.ok_or_else(|| anyhow::anyhow!("job {id} is missing"))?;
    assert_eq!(record.available_at - record.enqueued_at, 5 * 60 * 1000);
    assert_eq!(record.max_attempts, 5);

    queue.enqueue(&tracking(2), EnqueueOptions::immediately()).await?;
    let job = queue.try_dequeue::<TrackingJob>().await?.ok_or_else(|| anyhow::anyhow!("no immediate job"))?;
    assert_eq!(job.payload.fulfillment_id, 2);
    assert_eq!(job.attempt(), 1);
    Ok(())
}

#[tokio::test]
async fn expired_leases_are_redelivered() {
    let config = QueueConfig { lease: Duration::from_millis(30), ..QueueConfig::default() };
    let queue = queue_with(config).await;
    let id = queue.enqueue(&webhook(Topic::OrdersPaid, 1), EnqueueOptions::default()).await.unwrap();
    let first = queue.try_dequeue::<WebhookJob>().await.unwrap().expect("claimed");
    assert!(queue.try_dequeue::<WebhookJob>().await.unwrap().is_none());
    tokio::time::sleep(Duration::from_millis(60)).await;
    let again = tokio::time::timeout(Duration::from_secs(2), queue.dequeue::<WebhookJob>()).await.unwrap().unwrap();
    assert_eq!(first.id(), id);
    assert_eq!(again.id(), id);
    assert_eq!(again.attempt(), 2);
}

#[tokio::test]
async fn expired_lease_on_last_attempt_is_dead_lettered() -> anyhow::Result<()> {
    let config = QueueConfig { lease: Duration::from_millis(30), ..QueueConfig::default() };
    let queue = queue_with(config).await;
    let now = Utc::now().timestamp_millis();
    let last_chance = NewJob {
        queue: QueueName::Webhooks,
        payload: serde_json::to_string(&webhook(Topic::OrdersPaid, 1))?,
        priority: 1,
        max_attempts: 1,
        backoff_base_ms: 2000,
        enqueued_at: now,
        available_at: now,
    };
    let id = queue.broker().push_job(last_chance).await?;
    let claimed = queue.try_dequeue::<WebhookJob>().await?.ok_or_else(|| anyhow::anyhow!("job {id} not claimed"))?;
    assert_eq!(claimed.attempt(), 1);
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(queue.try_dequeue::<WebhookJob>().await?.is_none());
    let record = queue.fetch_job(id).await?.ok_or_else(|| anyhow::anyhow!("job {id} is missing"))?;
    assert_eq!(record.status, JobStatus::DeadLetter);
    assert_eq!(record.attempts, 1);
    assert!(queue.broker().next_available_at(QueueName::Webhooks).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn webhook_jobs_get_three_attempts() {
    let queue = queue_with(QueueConfig::default()).await;
    queue.enqueue(&webhook(Topic::OrdersPaid, 1), EnqueueOptions::default()).await.unwrap();
    let job = queue.try_dequeue::<WebhookJob>().await.unwrap().unwrap();
    let outcome = queue.nack(&job.record, "database is locked").await.unwrap();
    assert_eq!(outcome, NackOutcome::Retrying { after: Duration::from_secs(2) });
    let record = queue.fetch_job(job.id()).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Pending);
    assert_eq!(record.last_error.as_deref(), Some("database is locked"));

    let mut exhausted = record.clone();
    exhausted.attempts = 3;
    exhausted.status = JobStatus::Processing;
    assert_eq!(queue.nack(&exhausted, "still locked").await.unwrap(), NackOutcome::DeadLettered);
    assert_eq!(queue.fetch_job(job.id()).await.unwrap().unwrap().status, JobStatus::DeadLetter);
}

#[tokio::test]
async fn unreadable_payloads_are_dead_lettered() {
    let queue = queue_with(QueueConfig::default()).await;
    let now = Utc::now().timestamp_millis();
    let bad = NewJob {
        queue: QueueName::Webhooks,
        payload: "{\"not\": \"a webhook\"}".into(),
        priority: 1,
        max_attempts: 3,
        backoff_base_ms: 2000,
        enqueued_at: now,
        available_at: now,
    };
    let id = queue.broker().push_job(bad).await.unwrap();
    assert!(queue.try_dequeue::<WebhookJob>().await.unwrap().is_none());
    let dead = queue.dead_letters(QueueName::Webhooks, 10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].id, id);
}

#[tokio::test]
async fn finished_jobs_are_purged_after_retention() {
    let config = QueueConfig {
        completed_retention: Duration::ZERO,
        dead_letter_retention: Duration::from_secs(3600),
        ..QueueConfig::default()
    };
    let queue = queue_with(config).await;
    queue.enqueue(&webhook(Topic::OrdersPaid, 1), EnqueueOptions::default()).await.unwrap();
    queue.enqueue(&webhook(Topic::OrdersPaid, 2), EnqueueOptions::default()).await.unwrap();
    let done = queue.try_dequeue::<WebhookJob>().await.unwrap().unwrap();
    queue.ack(done.id()).await.unwrap();
    let dead = queue.try_dequeue::<WebhookJob>().await.unwrap().unwrap();
    queue.dead_letter(dead.id(), "gave up").await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(queue.purge_finished().await.unwrap(), 1);
    assert!(queue.fetch_job(done.id()).await.unwrap().is_none());
    assert!(queue.fetch_job(dead.id()).await.unwrap().is_some());
}

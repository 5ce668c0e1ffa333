use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use beeylo_sync_engine::{
    couriers::{Courier, CourierClient, CourierError, CourierTrackingResponse, TrackingNormalizer},
    db_types::{JobStatus, QueueName},
    events::EventProducers,
    queue::{JobQueue, QueueConfig, RetryPolicy, TrackingJob},
    rate_limiter::RateLimiter,
    sync_api::tracking_job_for,
    test_utils::{
        fixtures::{insert_test_store, order_payload},
        prepare_env::{prepare_test_env, random_db_path},
    },
    workers::{settle, JobHandler, Settlement, TrackingJobHandler},
    NotificationApi,
    SyncApi,
    TrackingApi,
};
use shopify_tools::ShopifyOrder;

struct BrokenCourier {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl CourierClient for BrokenCourier {
    fn courier(&self) -> Courier {
        Courier::Dhl
    }

    async fn fetch_tracking(&self, _tracking_number: &str) -> Result<CourierTrackingResponse, CourierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CourierError::Upstream("dhl responded with 503".into()))
    }
}

#[tokio::test]
async fn tracking_job_is_dead_lettered_after_five_attempts() {
    let db = prepare_test_env(&random_db_path()).await;
    let store = insert_test_store(&db, Default::default()).await;
    let mut payload = order_payload("123", "a@x.com", true);
    payload["fulfillments"] = serde_json::json!([{"id": 7, "tracking_company": "DHL", "tracking_number": "JD0146"}]);
    let order: ShopifyOrder = serde_json::from_value(payload).unwrap();
    let synced = SyncApi::new(db.clone()).sync_order(store.id, &order, None).await.unwrap();

    let config = QueueConfig {
        tracking: RetryPolicy {
            backoff_base: Duration::from_millis(10),
            initial_delay: Duration::ZERO,
            ..RetryPolicy::tracking()
        },
        ..QueueConfig::default()
    };
    let queue = JobQueue::new(db.clone(), config);
    let calls = Arc::new(AtomicUsize::new(0));
    let normalizer = TrackingNormalizer::new(RateLimiter::default())
        .with_client(Arc::new(BrokenCourier { calls: Arc::clone(&calls) }));
    let notifications = NotificationApi::new(db.clone(), EventProducers::default());
    let handler = TrackingJobHandler::new(TrackingApi::new(db.clone(), normalizer, notifications));

    let job = tracking_job_for(store.id, &synced.fulfillments[0]).expect("DHL shipments are tracked");
    let id = queue.enqueue(&job, Default::default()).await.unwrap();

    let mut delays = Vec::new();
    let last = loop {
        let claimed = tokio::time::timeout(Duration::from_secs(5), queue.dequeue::<TrackingJob>())
            .await
            .expect("job should become available")
            .unwrap();
        let result = handler.handle(&claimed).await;
        match settle(&queue, &claimed, result).await.unwrap() {
            Settlement::Retrying { after } => delays.push(after),
            other => break other,
        }
    };

    assert_eq!(last, Settlement::DeadLettered);
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(delays.len(), 4);
    assert!(delays.windows(2).all(|w| w[0] < w[1]), "backoff should grow: {delays:?}");
    let record = queue.fetch_job(id).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::DeadLetter);
    assert_eq!(record.attempts, 5);
    assert!(queue.try_dequeue::<TrackingJob>().await.unwrap().is_none());
    let dead = queue.dead_letters(QueueName::Tracking, 10).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert!(dead[0].last_error.as_deref().unwrap_or_default().contains("503"));
}

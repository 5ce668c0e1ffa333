use std::time::Duration;

use beeylo_sync_engine::{
    db_types::{NotificationChannel, NotificationType, Store, StoreSettings},
    events::EventProducers,
    queue::{EnqueueOptions, JobQueue, QueueConfig, Topic, WebhookJob},
    rate_limiter::RateLimiter,
    test_utils::{
        fixtures::{fulfillment_payload, insert_test_store, order_payload},
        prepare_env::{prepare_test_env, random_db_path},
    },
    traits::{NotificationDatabase, SyncDatabase},
    workers::{WebhookJobHandler, WorkerPool},
    NotificationApi,
    SqliteDatabase,
    SyncApi,
    WebhookProcessor,
};
use chrono::Utc;
use serde_json::Value;

fn webhook(store: &Store, topic: Topic, payload: Value) -> WebhookJob {
    WebhookJob { store_id: store.id, shop_domain: store.shop_domain.clone(), topic, payload, received_at: Utc::now() }
}

fn start_pool(db: &SqliteDatabase, queue: &JobQueue<SqliteDatabase>) -> WorkerPool {
    let producers = EventProducers::default();
    let processor = WebhookProcessor::new(
        SyncApi::new(db.clone()),
        NotificationApi::new(db.clone(), producers.clone()),
        queue.clone(),
        producers,
    );
    WorkerPool::start::<_, WebhookJob, _>(2, queue.clone(), WebhookJobHandler::new(processor), RateLimiter::default())
}

async fn wait_for_job(queue: &JobQueue<SqliteDatabase>, id: i64) {
    for _ in 0..200 {
        let job = queue.fetch_job(id).await.expect("job lookup").expect("job exists");
        if job.finished_at.is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("Job {id} was not processed in time");
}

#[tokio::test]
async fn order_created_webhook_is_synced_by_the_workers() {
    let db = prepare_test_env(&random_db_path()).await;
    let store = insert_test_store(&db, StoreSettings::default()).await;
    let queue = JobQueue::new(db.clone(), QueueConfig::default());
    let pool = start_pool(&db, &queue);

    let job = webhook(&store, Topic::OrdersCreate, order_payload("123", "a@x.com", true));
    let id = queue.enqueue(&job, EnqueueOptions::default()).await.expect("enqueue");
    wait_for_job(&queue, id).await;
    pool.shutdown().await;

    let order = db.fetch_order_by_shopify_id(store.id, "123").await.unwrap().expect("order was synced");
    assert!(order.receive_in_app);
    assert_eq!(order.total_price.to_string(), "19.98");
    assert_eq!(order.line_items.len(), 1);
    assert_eq!(order.line_items[0].quantity, 2);
    let notifications = db.fetch_notifications_for_order(order.id).await.unwrap();
    let in_app = notifications.iter().filter(|n| n.channel == NotificationChannel::InApp).count();
    let email = notifications.iter().filter(|n| n.channel == NotificationChannel::Email).count();
    assert_eq!(in_app, 1);
    assert_eq!(email, 0);
    assert_eq!(notifications[0].notification_type, NotificationType::OrderConfirmation);
}

#[tokio::test]
async fn shipping_emails_are_suppressed_for_app_orders() {
    let db = prepare_test_env(&random_db_path()).await;
    let settings = StoreSettings { suppress_shopify_notifications_for_beeylo_orders: true, ..Default::default() };
    let store = insert_test_store(&db, settings).await;
    let queue = JobQueue::new(db.clone(), QueueConfig::default());
    let pool = start_pool(&db, &queue);

    let order = webhook(&store, Topic::OrdersCreate, order_payload("123", "a@x.com", true));
    wait_for_job(&queue, queue.enqueue(&order, EnqueueOptions::default()).await.unwrap()).await;
    let shipped = fulfillment_payload(901, "123", "PostNL", "3SABCD1234567");
    for _ in 0..2 {
        let job = webhook(&store, Topic::FulfillmentsCreate, shipped.clone());
        wait_for_job(&queue, queue.enqueue(&job, EnqueueOptions::default()).await.unwrap()).await;
    }
    pool.shutdown().await;

    let order = db.fetch_order_by_shopify_id(store.id, "123").await.unwrap().unwrap();
    let shipping = db
        .fetch_notifications_for_order(order.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.notification_type == NotificationType::OrderShipped)
        .collect::<Vec<_>>();
    assert_eq!(shipping.len(), 1);
    assert_eq!(shipping[0].channel, NotificationChannel::InApp);
}

#[tokio::test]
async fn replayed_webhooks_leave_the_same_state() {
    let db = prepare_test_env(&random_db_path()).await;
    let store = insert_test_store(&db, StoreSettings::default()).await;
    let queue = JobQueue::new(db.clone(), QueueConfig::default());
    let pool = start_pool(&db, &queue);

    let mut payload = order_payload("555", "c@x.com", false);
    payload["customer"] = serde_json::json!({"id": 42, "email": "c@x.com", "first_name": "Cleo"});
    let job = webhook(&store, Topic::OrdersUpdated, payload);
    wait_for_job(&queue, queue.enqueue(&job, EnqueueOptions::default()).await.unwrap()).await;
    let first = db.fetch_order_by_shopify_id(store.id, "555").await.unwrap().unwrap();
    wait_for_job(&queue, queue.enqueue(&job, EnqueueOptions::default()).await.unwrap()).await;
    pool.shutdown().await;
    let second = db.fetch_order_by_shopify_id(store.id, "555").await.unwrap().unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.customer_id, second.customer_id);
    assert_eq!(serde_json::to_value(&first.line_items).unwrap(), serde_json::to_value(&second.line_items).unwrap());
    assert_eq!(first.total_price, second.total_price);
    assert_eq!(first.receive_in_app, second.receive_in_app);
}

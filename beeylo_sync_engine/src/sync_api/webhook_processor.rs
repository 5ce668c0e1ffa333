use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use shopify_tools::{ShopifyCustomer, ShopifyFulfillment, ShopifyOrder};

use crate::{
    db_types::{Fulfillment, Store},
    events::{AppDeliveryOrderEvent, EventProducers},
    queue::{EnqueueOptions, JobQueue, Topic, WebhookJob},
    rate_limiter::{LimiterKey, RateLimiter},
    sync_api::{
        errors::SyncError,
        notification_api::NotificationApi,
        sync_api::{SyncApi, SyncedOrder},
        tracking_api::tracking_job_for,
    },
    traits::{JobBroker, NotificationDatabase, StorefrontApi, StorefrontError, SyncDatabase},
};

pub const MANUAL_SYNC_PAGE_SIZE: u32 = 250;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WebhookOutcome {
    pub order_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub tracking_jobs: usize,
    pub notifications: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ManualSyncSummary {
    pub orders_synced: usize,
    pub customers_synced: usize,
    pub failed: usize,
    pub tracking_jobs: usize,
}

/// Processes queued webhook deliveries.
///
/// State sync is the primary path: its failures are returned, so the job is retried. Everything that follows a
/// successful sync (notifications, tagging, tracking jobs) is best-effort and only logged when it fails.
pub struct WebhookProcessor<B> {
    sync: SyncApi<B>,
    notifications: NotificationApi<B>,
    queue: JobQueue<B>,
    producers: EventProducers,
}

impl<B> Debug for WebhookProcessor<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WebhookProcessor")
    }
}

impl<B: Clone> Clone for WebhookProcessor<B> {
    fn clone(&self) -> Self {
        Self {
            sync: self.sync.clone(),
            notifications: self.notifications.clone(),
            queue: self.queue.clone(),
            producers: self.producers.clone(),
        }
    }
}

/// Only JSON objects are accepted. Serde would otherwise read an array into a struct, field by field.
fn decode<T: DeserializeOwned>(topic: Topic, payload: &Value) -> Result<T, SyncError> {
    if !payload.is_object() {
        return Err(SyncError::InvalidPayload(format!("{topic}: expected a JSON object")));
    }
    serde_json::from_value(payload.clone()).map_err(|e| SyncError::InvalidPayload(format!("{topic}: {e}")))
}

impl<B> WebhookProcessor<B>
where B: SyncDatabase + NotificationDatabase + JobBroker
{
    pub fn new(
        sync: SyncApi<B>,
        notifications: NotificationApi<B>,
        queue: JobQueue<B>,
        producers: EventProducers,
    ) -> Self {
        Self { sync, notifications, queue, producers }
    }

    pub fn sync_api(&self) -> &SyncApi<B> {
        &self.sync
    }

    pub async fn process(&self, job: &WebhookJob) -> Result<WebhookOutcome, SyncError> {
        let store = self
            .sync
            .db()
            .fetch_store(job.store_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("Store #{} ({})", job.store_id, job.shop_domain)))?;
        if !store.is_active {
            info!("🔄️ Store {} is inactive. Dropping its {} webhook", store.shop_domain, job.topic);
            return Ok(WebhookOutcome::default());
        }
        debug!("🔄️ Processing {} webhook for {}", job.topic, store.shop_domain);
        match job.topic {
            Topic::OrdersCreate => self.order_created(&store, &decode(job.topic, &job.payload)?).await,
            Topic::OrdersUpdated | Topic::OrdersPaid | Topic::OrdersFulfilled => {
                let synced = self.sync.sync_order(store.id, &decode(job.topic, &job.payload)?, None).await?;
                let tracking_jobs = self.enqueue_tracking(store.id, &synced.fulfillments).await;
                Ok(WebhookOutcome { tracking_jobs, ..outcome_for(&synced) })
            },
            Topic::OrdersCancelled => {
                let synced = self.sync.sync_order(store.id, &decode(job.topic, &job.payload)?, None).await?;
                let notifications = match self.notifications.notify_cancelled(&store, &synced.order).await {
                    Ok(created) => created.len(),
                    Err(e) => {
                        warn!("🔔️ Could not create the cancellation notice for order #{}. {e}", synced.order.id);
                        0
                    },
                };
                Ok(WebhookOutcome { notifications, ..outcome_for(&synced) })
            },
            Topic::FulfillmentsCreate | Topic::FulfillmentsUpdate => {
                let fulfillment: ShopifyFulfillment = decode(job.topic, &job.payload)?;
                let (order, fulfillment) = self.sync.sync_fulfillment_for_store(store.id, &fulfillment).await?;
                let mut notifications = 0;
                if job.topic == Topic::FulfillmentsCreate {
                    match self.notifications.notify_fulfillment_created(&store, &order, &fulfillment).await {
                        Ok(created) => notifications = created.len(),
                        Err(e) => warn!("🔔️ Could not create the shipping notice for order #{}. {e}", order.id),
                    }
                }
                let tracking_jobs = self.enqueue_tracking(store.id, std::slice::from_ref(&fulfillment)).await;
                Ok(WebhookOutcome {
                    order_id: Some(order.id),
                    customer_id: order.customer_id,
                    tracking_jobs,
                    notifications,
                })
            },
            Topic::CustomersCreate | Topic::CustomersUpdate => {
                let customer: ShopifyCustomer = decode(job.topic, &job.payload)?;
                let customer = self.sync.sync_customer(store.id, &customer).await?;
                Ok(WebhookOutcome { customer_id: Some(customer.id), ..Default::default() })
            },
        }
    }

    async fn order_created(&self, store: &Store, order: &ShopifyOrder) -> Result<WebhookOutcome, SyncError> {
        let synced = self.sync.sync_order(store.id, order, None).await?;
        if synced.order.receive_in_app {
            info!("🔄️ Order #{} on {} is an app-delivery order", synced.order.id, store.shop_domain);
            let event = AppDeliveryOrderEvent::new(store.clone(), synced.order.clone());
            self.producers.publish_app_delivery_order(event).await;
        }
        let notifications = match self.notifications.notify_order_created(store, &synced.order).await {
            Ok(created) => created.len(),
            Err(e) => {
                warn!("🔔️ Could not create the order confirmation for order #{}. {e}", synced.order.id);
                0
            },
        };
        let tracking_jobs = self.enqueue_tracking(store.id, &synced.fulfillments).await;
        Ok(WebhookOutcome { notifications, tracking_jobs, ..outcome_for(&synced) })
    }

    async fn enqueue_tracking(&self, store_id: i64, fulfillments: &[Fulfillment]) -> usize {
        let mut queued = 0;
        for job in fulfillments.iter().filter_map(|f| tracking_job_for(store_id, f)) {
            match self.queue.enqueue(&job, EnqueueOptions::default()).await {
                Ok(id) => {
                    debug!("🚚️ Tracking job {id} queued for fulfillment #{}", job.fulfillment_id);
                    queued += 1;
                },
                Err(e) => warn!("🚚️ Could not queue tracking for fulfillment #{}. {e}", job.fulfillment_id),
            }
        }
        queued
    }

    /// Pulls orders from the storefront and syncs them the way the webhooks would, without sending notifications.
    ///
    /// Storefront calls go through the store's rate limiter. A failure to fetch is returned; a failure to sync an
    /// individual order is counted and logged.
    pub async fn manual_sync<S: StorefrontApi + ?Sized>(
        &self,
        storefront: &S,
        limiter: &RateLimiter,
        store_id: i64,
        since: Option<DateTime<Utc>>,
    ) -> Result<ManualSyncSummary, SyncError> {
        let store = self
            .sync
            .db()
            .fetch_store(store_id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("Store #{store_id}")))?;
        info!("🔄️ Manual sync of {} started (since {since:?})", store.shop_domain);
        let orders = limiter
            .schedule(LimiterKey::Store(store.id), storefront.fetch_orders(&store, since, MANUAL_SYNC_PAGE_SIZE))
            .await
            .map_err(|e| StorefrontError::Transient(e.to_string()))??;
        let mut summary = ManualSyncSummary::default();
        for order in &orders {
            match self.sync.sync_order(store.id, order, None).await {
                Ok(synced) => {
                    summary.orders_synced += 1;
                    if synced.customer.is_some() {
                        summary.customers_synced += 1;
                    }
                    summary.tracking_jobs += self.enqueue_tracking(store.id, &synced.fulfillments).await;
                },
                Err(e) => {
                    summary.failed += 1;
                    warn!("🔄️ Manual sync could not sync order {:?} on {}. {e}", order.id, store.shop_domain);
                },
            }
        }
        info!(
            "🔄️ Manual sync of {} finished. {} orders and {} customers synced, {} failed",
            store.shop_domain, summary.orders_synced, summary.customers_synced, summary.failed
        );
        Ok(summary)
    }
}

fn outcome_for(synced: &SyncedOrder) -> WebhookOutcome {
    WebhookOutcome {
        order_id: Some(synced.order.id),
        customer_id: synced.customer.as_ref().map(|c| c.id),
        ..Default::default()
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::{
        db_types::{NotificationChannel, NotificationType, QueueName},
        events::{EventHandlers, EventHooks},
        queue::QueueConfig,
        test_utils::{
            fixtures::{fulfillment_payload, insert_test_store, order_payload},
            prepare_env::{prepare_test_env, random_db_path},
        },
        SqliteDatabase,
    };

    fn processor(db: &SqliteDatabase, producers: EventProducers) -> WebhookProcessor<SqliteDatabase> {
        WebhookProcessor::new(
            SyncApi::new(db.clone()),
            NotificationApi::new(db.clone(), producers.clone()),
            JobQueue::new(db.clone(), QueueConfig::default()),
            producers,
        )
    }

    fn job(store: &Store, topic: Topic, payload: Value) -> WebhookJob {
        WebhookJob { store_id: store.id, shop_domain: store.shop_domain.clone(), topic, payload, received_at: Utc::now() }
    }

    #[tokio::test]
    async fn order_created_opted_in() {
        let db = prepare_test_env(&random_db_path()).await;
        let store = insert_test_store(&db, Default::default()).await;
        let tagged = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&tagged);
        let mut hooks = EventHooks::default();
        hooks.on_app_delivery_order(move |_| {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });
        let handlers = EventHandlers::new(8, hooks);
        let processor = processor(&db, handlers.producers());
        handlers.start_handlers();

        let outcome = processor.process(&job(&store, Topic::OrdersCreate, order_payload("123", "a@x.com", true))).await.unwrap();
        assert_eq!(outcome.notifications, 1);
        let order_id = outcome.order_id.unwrap();
        let order = db.fetch_order(order_id).await.unwrap().unwrap();
        assert!(order.receive_in_app);
        assert_eq!(order.total_price.to_string(), "19.98");
        let notifications = db.fetch_notifications_for_order(order_id).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].channel, NotificationChannel::InApp);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(tagged.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fulfillment_created_queues_tracking() {
        let db = prepare_test_env(&random_db_path()).await;
        let store = insert_test_store(&db, Default::default()).await;
        let processor = processor(&db, EventProducers::default());
        processor.process(&job(&store, Topic::OrdersCreate, order_payload("123", "a@x.com", false))).await.unwrap();
        let payload = fulfillment_payload(55, "123", "PostNL", "3SABCD1234567");
        let outcome = processor.process(&job(&store, Topic::FulfillmentsCreate, payload.clone())).await.unwrap();
        assert_eq!(outcome.tracking_jobs, 1);
        assert_eq!(outcome.notifications, 2);
        let replay = processor.process(&job(&store, Topic::FulfillmentsCreate, payload)).await.unwrap();
        assert_eq!(replay.notifications, 0);
        let shipped = db
            .fetch_notifications_for_order(outcome.order_id.unwrap())
            .await
            .unwrap()
            .into_iter()
            .filter(|n| n.notification_type == NotificationType::OrderShipped)
            .count();
        assert_eq!(shipped, 2);
        let queued = db.next_available_at(QueueName::Tracking).await.unwrap();
        assert!(queued.is_some());
    }

    #[tokio::test]
    async fn fulfillment_before_order_is_not_found() {
        let db = prepare_test_env(&random_db_path()).await;
        let store = insert_test_store(&db, Default::default()).await;
        let processor = processor(&db, EventProducers::default());
        let payload = fulfillment_payload(55, "999", "PostNL", "3S1");
        let err = processor.process(&job(&store, Topic::FulfillmentsCreate, payload)).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[tokio::test]
    async fn malformed_payload() {
        let db = prepare_test_env(&random_db_path()).await;
        let store = insert_test_store(&db, Default::default()).await;
        let processor = processor(&db, EventProducers::default());
        let err = processor.process(&job(&store, Topic::CustomersCreate, json!(["not", "a", "customer"]))).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidPayload(_)));
        let err = processor.process(&job(&store, Topic::OrdersUpdated, json!({"email": "a@x.com"}))).await.unwrap_err();
        assert!(matches!(err, SyncError::MissingPrimaryKey("order")));
    }

    struct FakeStorefront {
        orders: Vec<ShopifyOrder>,
    }

    #[async_trait]
    impl StorefrontApi for FakeStorefront {
        async fn fetch_orders(
            &self,
            _store: &Store,
            _since: Option<DateTime<Utc>>,
            _limit: u32,
        ) -> Result<Vec<ShopifyOrder>, StorefrontError> {
            Ok(self.orders.clone())
        }

        async fn add_order_tag(&self, _store: &Store, _id: &str, _tag: &str) -> Result<(), StorefrontError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn manual_sync_counts() {
        let db = prepare_test_env(&random_db_path()).await;
        let store = insert_test_store(&db, Default::default()).await;
        let mut with_customer = order_payload("1", "a@x.com", false);
        with_customer["customer"] = json!({"id": 77, "email": "a@x.com"});
        let orders = vec![
            serde_json::from_value(with_customer).unwrap(),
            serde_json::from_value(order_payload("2", "b@x.com", true)).unwrap(),
            serde_json::from_value(json!({"email": "no-id@x.com"})).unwrap(),
        ];
        let storefront = FakeStorefront { orders };
        let processor = processor(&db, EventProducers::default());
        let summary = processor.manual_sync(&storefront, &RateLimiter::default(), store.id, None).await.unwrap();
        assert_eq!(summary, ManualSyncSummary { orders_synced: 2, customers_synced: 1, failed: 1, tracking_jobs: 0 });
        let order = db.fetch_order_by_shopify_id(store.id, "2").await.unwrap().unwrap();
        assert!(db.fetch_notifications_for_order(order.id).await.unwrap().is_empty());
    }
}

use std::{fmt::Debug, time::Duration};

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    couriers::{Courier, CourierError, CourierTrackingResponse, TrackingNormalizer},
    db_types::{Fulfillment, FulfillmentTrackingUpdate, NewTrackingEvent, ShipmentStatus},
    queue::{EnqueueOptions, JobQueue, TrackingJob},
    sync_api::{errors::TrackingError, notification_api::NotificationApi},
    traits::{JobBroker, NotificationDatabase, SyncDatabase, TrackingDatabase},
};

/// Shipments are looked up again once their last check is older than this.
pub const RECHECK_AFTER: Duration = Duration::from_secs(2 * 60 * 60);
pub const RECHECK_BATCH: u32 = 100;

/// The tracking job for a fulfillment, if it has a tracking number from a courier we can query and has not reached
/// a final state.
pub fn tracking_job_for(store_id: i64, fulfillment: &Fulfillment) -> Option<TrackingJob> {
    if !fulfillment.has_tracking() || fulfillment.shipment_status.is_some_and(|s| s.is_terminal()) {
        return None;
    }
    let company = fulfillment.tracking_company.as_deref()?;
    Courier::resolve(company)?;
    Some(TrackingJob {
        store_id,
        order_id: fulfillment.order_id,
        fulfillment_id: fulfillment.id,
        tracking_number: fulfillment.tracking_number.clone()?.trim().to_string(),
        tracking_company: Some(company.to_string()),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingOutcome {
    /// No courier lookup was made. The storefront's own tracking status stands.
    Skipped(String),
    Updated { status: ShipmentStatus, events: usize, delivered_now: bool },
}

/// `TrackingApi` applies courier tracking lookups to fulfillments.
pub struct TrackingApi<B> {
    db: B,
    normalizer: TrackingNormalizer,
    notifications: NotificationApi<B>,
}

impl<B> Debug for TrackingApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TrackingApi")
    }
}

impl<B: Clone> Clone for TrackingApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), normalizer: self.normalizer.clone(), notifications: self.notifications.clone() }
    }
}

impl<B> TrackingApi<B>
where B: SyncDatabase + TrackingDatabase + NotificationDatabase
{
    pub fn new(db: B, normalizer: TrackingNormalizer, notifications: NotificationApi<B>) -> Self {
        Self { db, normalizer, notifications }
    }

    pub fn normalizer(&self) -> &TrackingNormalizer {
        &self.normalizer
    }

    /// Looks the shipment up with its courier, stores the new events and status, and sends the delivery notification
    /// when the courier first reports the shipment as delivered.
    ///
    /// A shipment that cannot be looked up (no carrier, no adapter, or unknown to the courier) still has its check
    /// time recorded, so the recheck sweep moves on to other shipments.
    pub async fn process_tracking(&self, job: &TrackingJob) -> Result<TrackingOutcome, TrackingError> {
        let fulfillment =
            self.db.fetch_fulfillment(job.fulfillment_id).await?.ok_or(TrackingError::FulfillmentNotFound(job.fulfillment_id))?;
        let carrier = job.tracking_company.as_deref().or(fulfillment.tracking_company.as_deref()).unwrap_or_default();
        if carrier.trim().is_empty() {
            self.mark_checked(fulfillment.id).await;
            return Ok(TrackingOutcome::Skipped(format!("Fulfillment #{} has no carrier", fulfillment.id)));
        }
        let response = match self.normalizer.fetch_tracking(carrier, &job.tracking_number).await {
            Ok(Some(response)) => response,
            Ok(None) => {
                self.mark_checked(fulfillment.id).await;
                return Ok(TrackingOutcome::Skipped(format!("No tracking adapter for '{carrier}'")));
            },
            Err(e @ CourierError::NotFound(_)) => {
                self.mark_checked(fulfillment.id).await;
                return Err(e.into());
            },
            Err(e) => return Err(e.into()),
        };
        let was_delivered = fulfillment.shipment_status == Some(ShipmentStatus::Delivered);
        let updated = self.apply(&fulfillment, &response).await?;
        let delivered_now = !was_delivered && updated.shipment_status == Some(ShipmentStatus::Delivered);
        info!(
            "🚚️ Fulfillment #{} ({} {}) is {}",
            updated.id, response.courier, job.tracking_number, response.status
        );
        if updated.shipment_status == Some(ShipmentStatus::Delivered) {
            self.notify_delivered(&updated).await;
        }
        Ok(TrackingOutcome::Updated { status: response.status, events: response.events.len(), delivered_now })
    }

    async fn apply(&self, fulfillment: &Fulfillment, response: &CourierTrackingResponse) -> Result<Fulfillment, TrackingError> {
        for event in &response.events {
            let new_event = NewTrackingEvent {
                fulfillment_id: fulfillment.id,
                courier: response.courier.as_str().to_string(),
                status: event.status,
                description: event.description.clone(),
                location: event.location.clone(),
                timestamp: event.timestamp,
            };
            self.db.create_tracking_event(new_event).await?;
        }
        let now = Utc::now();
        let delivered = response.is_delivered();
        let actual_delivery = match (response.actual_delivery, delivered) {
            (Some(at), _) => Some(at),
            (None, true) => Some(
                response
                    .events
                    .iter()
                    .rev()
                    .find(|e| e.status == ShipmentStatus::Delivered)
                    .map(|e| e.timestamp)
                    .unwrap_or(now),
            ),
            (None, false) => None,
        };
        let update = FulfillmentTrackingUpdate {
            fulfillment_id: fulfillment.id,
            shipment_status: if delivered { ShipmentStatus::Delivered } else { response.status },
            estimated_delivery: response.estimated_delivery,
            actual_delivery,
            checked_at: now,
        };
        Ok(self.db.update_fulfillment_tracking(update).await?)
    }

    async fn mark_checked(&self, fulfillment_id: i64) {
        if let Err(e) = self.db.mark_tracking_checked(fulfillment_id, Utc::now()).await {
            warn!("🚚️ Could not record the tracking check for fulfillment #{fulfillment_id}. {e}");
        }
    }

    async fn notify_delivered(&self, fulfillment: &Fulfillment) {
        let order = match self.db.fetch_order(fulfillment.order_id).await {
            Ok(Some(order)) => order,
            Ok(None) => return warn!("🔔️ Order #{} for fulfillment #{} is missing", fulfillment.order_id, fulfillment.id),
            Err(e) => return warn!("🔔️ Could not load order #{} for a delivery notice. {e}", fulfillment.order_id),
        };
        let store = match self.db.fetch_store(order.store_id).await {
            Ok(Some(store)) => store,
            Ok(None) => return warn!("🔔️ Store #{} for order #{} is missing", order.store_id, order.id),
            Err(e) => return warn!("🔔️ Could not load store #{} for a delivery notice. {e}", order.store_id),
        };
        if let Err(e) = self.notifications.notify_delivered(&store, &order, fulfillment).await {
            warn!("🔔️ Could not create the delivery notice for fulfillment #{}. {e}", fulfillment.id);
        }
    }

    /// Queues an immediate lookup for one fulfillment. Returns the job id, or `None` if it cannot be tracked.
    pub async fn refresh_fulfillment<Q: JobBroker>(
        &self,
        queue: &JobQueue<Q>,
        fulfillment_id: i64,
    ) -> Result<Option<i64>, TrackingError> {
        let fulfillment =
            self.db.fetch_fulfillment(fulfillment_id).await?.ok_or(TrackingError::FulfillmentNotFound(fulfillment_id))?;
        let Some(order) = self.db.fetch_order(fulfillment.order_id).await? else {
            return Err(TrackingError::FulfillmentNotFound(fulfillment_id));
        };
        match tracking_job_for(order.store_id, &fulfillment) {
            Some(job) => Ok(Some(queue.enqueue(&job, EnqueueOptions::immediately()).await?)),
            None => Ok(None),
        }
    }

    /// Queues lookups for shipments still in transit that have not been checked since `checked_before`.
    ///
    /// Every shipment in the batch has its check time stamped, whether it was queued or not. Shipments with a
    /// carrier we cannot track would otherwise stay at the head of every batch.
    pub async fn recheck_active_shipments<Q: JobBroker>(
        &self,
        queue: &JobQueue<Q>,
        checked_before: DateTime<Utc>,
        limit: u32,
    ) -> Result<usize, TrackingError> {
        let shipments = self.db.fetch_shipments_to_check(checked_before, limit).await?;
        let mut queued = 0;
        for shipment in shipments {
            let fulfillment_id = shipment.fulfillment.id;
            match tracking_job_for(shipment.store_id, &shipment.fulfillment) {
                Some(job) => {
                    queue.enqueue(&job, EnqueueOptions::immediately()).await?;
                    queued += 1;
                },
                None => trace!("🚚️ Fulfillment #{fulfillment_id} has no trackable carrier. Leaving it for now."),
            }
            self.db.mark_tracking_checked(fulfillment_id, Utc::now()).await?;
        }
        if queued > 0 {
            info!("🚚️ Queued {queued} active shipments for another tracking lookup");
        }
        Ok(queued)
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use chrono::TimeZone;
    use shopify_tools::ShopifyOrder;

    use super::*;
    use crate::{
        couriers::{CourierEvent, CourierError, MockCourierClient},
        db_types::{NotificationType, Store},
        events::EventProducers,
        queue::QueueConfig,
        rate_limiter::RateLimiter,
        sync_api::SyncApi,
        test_utils::{
            fixtures::{insert_test_store, order_payload},
            prepare_env::{prepare_test_env, random_db_path},
        },
        SqliteDatabase,
    };

    async fn setup() -> (SqliteDatabase, Store, Fulfillment) {
        let db = prepare_test_env(&random_db_path()).await;
        let store = insert_test_store(&db, Default::default()).await;
        let mut payload = order_payload("123", "a@x.com", true);
        payload["fulfillments"] =
            serde_json::json!([{"id": 7, "tracking_company": "DHL Express", "tracking_number": "JD014600006281"}]);
        let order: ShopifyOrder = serde_json::from_value(payload).unwrap();
        let synced = SyncApi::new(db.clone()).sync_order(store.id, &order, None).await.unwrap();
        (db, store, synced.fulfillments[0].clone())
    }

    fn delivered_response() -> CourierTrackingResponse {
        let at = |h| Utc.with_ymd_and_hms(2024, 3, 1, h, 0, 0).unwrap();
        let mut response = CourierTrackingResponse::new(Courier::Dhl, "JD014600006281", ShipmentStatus::Delivered);
        response.events = vec![
            CourierEvent {
                timestamp: at(8),
                status: ShipmentStatus::InTransit,
                description: "Sorted".into(),
                location: Some("Utrecht".into()),
            },
            CourierEvent {
                timestamp: at(14),
                status: ShipmentStatus::Delivered,
                description: "Delivered".into(),
                location: Some("Amsterdam".into()),
            },
        ];
        response
    }

    fn api(db: &SqliteDatabase, result: Result<CourierTrackingResponse, CourierError>) -> TrackingApi<SqliteDatabase> {
        let mut client = MockCourierClient::new();
        client.expect_courier().return_const(Courier::Dhl);
        client.expect_fetch_tracking().returning(move |_| result.clone());
        let normalizer = TrackingNormalizer::new(RateLimiter::default()).with_client(Arc::new(client));
        let notifications = NotificationApi::new(db.clone(), EventProducers::default());
        TrackingApi::new(db.clone(), normalizer, notifications)
    }

    #[test]
    fn only_known_couriers_are_tracked() {
        let fulfillment = Fulfillment {
            id: 1,
            order_id: 2,
            shopify_fulfillment_id: "1".into(),
            status: None,
            tracking_company: Some("Bob's Van".into()),
            tracking_number: Some("X1".into()),
            tracking_url: None,
            shipment_status: None,
            line_items: vec![],
            estimated_delivery: None,
            actual_delivery: None,
            tracking_checked_at: None,
            created_at: None,
            updated_at: None,
        };
        assert!(tracking_job_for(1, &fulfillment).is_none());
        let ups = Fulfillment { tracking_company: Some("UPS".into()), ..fulfillment.clone() };
        assert_eq!(tracking_job_for(1, &ups).map(|j| j.tracking_number), Some("X1".to_string()));
        let blank = Fulfillment { tracking_number: Some("  ".into()), ..ups.clone() };
        assert!(tracking_job_for(1, &blank).is_none());
        let delivered = Fulfillment { shipment_status: Some(ShipmentStatus::Delivered), ..ups };
        assert!(tracking_job_for(1, &delivered).is_none());
    }

    #[tokio::test]
    async fn delivered_shipment_is_recorded_and_notified_once() {
        let (db, _store, fulfillment) = setup().await;
        let api = api(&db, Ok(delivered_response()));
        let job = tracking_job_for(1, &fulfillment).unwrap();
        let outcome = api.process_tracking(&job).await.unwrap();
        assert_eq!(outcome, TrackingOutcome::Updated { status: ShipmentStatus::Delivered, events: 2, delivered_now: true });
        let outcome = api.process_tracking(&job).await.unwrap();
        assert!(matches!(outcome, TrackingOutcome::Updated { delivered_now: false, .. }));

        assert_eq!(db.fetch_tracking_events(fulfillment.id).await.unwrap().len(), 2);
        let stored = db.fetch_fulfillment(fulfillment.id).await.unwrap().unwrap();
        assert_eq!(stored.shipment_status, Some(ShipmentStatus::Delivered));
        assert_eq!(stored.actual_delivery, Some(Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap()));
        assert!(stored.tracking_checked_at.is_some());
        let delivered = db
            .fetch_notifications_for_order(fulfillment.order_id)
            .await
            .unwrap()
            .into_iter()
            .filter(|n| n.notification_type == NotificationType::OrderDelivered)
            .count();
        assert_eq!(delivered, 1);
    }

    #[tokio::test]
    async fn unconfigured_courier_is_skipped() {
        let (db, _store, fulfillment) = setup().await;
        let notifications = NotificationApi::new(db.clone(), EventProducers::default());
        let api = TrackingApi::new(db.clone(), TrackingNormalizer::new(RateLimiter::default()), notifications);
        let job = tracking_job_for(1, &fulfillment).unwrap();
        assert!(matches!(api.process_tracking(&job).await.unwrap(), TrackingOutcome::Skipped(_)));
        let stored = db.fetch_fulfillment(fulfillment.id).await.unwrap().unwrap();
        assert!(stored.tracking_checked_at.is_some());
        assert_eq!(stored.shipment_status, fulfillment.shipment_status);
    }

    #[tokio::test]
    async fn unknown_tracking_number_is_still_marked_checked() {
        let (db, _store, fulfillment) = setup().await;
        let api = api(&db, Err(CourierError::NotFound("no such parcel".into())));
        let job = tracking_job_for(1, &fulfillment).unwrap();
        let err = api.process_tracking(&job).await.unwrap_err();
        assert!(matches!(err, TrackingError::Courier(CourierError::NotFound(_))));
        let stored = db.fetch_fulfillment(fulfillment.id).await.unwrap().unwrap();
        assert!(stored.tracking_checked_at.is_some());
    }

    #[tokio::test]
    async fn missing_fulfillment() {
        let (db, _store, fulfillment) = setup().await;
        let api = api(&db, Ok(delivered_response()));
        let job = TrackingJob { fulfillment_id: 999, ..tracking_job_for(1, &fulfillment).unwrap() };
        assert!(matches!(api.process_tracking(&job).await, Err(TrackingError::FulfillmentNotFound(999))));
    }

    #[tokio::test]
    async fn recheck_queues_unchecked_shipments() {
        let (db, _store, _fulfillment) = setup().await;
        let api = api(&db, Err(CourierError::Upstream("down".into())));
        let queue = JobQueue::new(db.clone(), QueueConfig::default());
        let queued = api.recheck_active_shipments(&queue, Utc::now(), RECHECK_BATCH).await.unwrap();
        assert_eq!(queued, 1);
        let job = queue.try_dequeue::<TrackingJob>().await.unwrap().expect("job is available immediately");
        assert_eq!(job.payload.tracking_company.as_deref(), Some("DHL Express"));
        // Stamped when queued, so the next sweep does not queue it a second time
        assert_eq!(api.recheck_active_shipments(&queue, Utc::now() - chrono::Duration::minutes(1), RECHECK_BATCH).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn untrackable_shipments_do_not_block_the_batch() {
        let db = prepare_test_env(&random_db_path()).await;
        let store = insert_test_store(&db, Default::default()).await;
        let mut payload = order_payload("500", "b@x.com", false);
        payload["fulfillments"] = serde_json::json!([
            {"id": 1, "tracking_company": "Royal Mail", "tracking_number": "RM1"},
            {"id": 2, "tracking_company": "DHL", "tracking_number": "JD1"}
        ]);
        let order: ShopifyOrder = serde_json::from_value(payload).unwrap();
        let synced = SyncApi::new(db.clone()).sync_order(store.id, &order, None).await.unwrap();
        let (royal_mail, dhl) = (synced.fulfillments[0].id, synced.fulfillments[1].id);
        assert!(royal_mail < dhl);

        let api = api(&db, Err(CourierError::Upstream("down".into())));
        let queue = JobQueue::new(db.clone(), QueueConfig::default());
        let cutoff = Utc::now() + chrono::Duration::hours(1);
        let mut queued = Vec::new();
        for _ in 0..3 {
            queued.push(api.recheck_active_shipments(&queue, cutoff, 1).await.unwrap());
        }
        assert_eq!(queued, vec![0, 1, 0]);
        let job = queue.try_dequeue::<TrackingJob>().await.unwrap().expect("the DHL shipment is queued");
        assert_eq!(job.payload.fulfillment_id, dhl);
        assert!(queue.try_dequeue::<TrackingJob>().await.unwrap().is_none());
        let skipped = db.fetch_fulfillment(royal_mail).await.unwrap().unwrap();
        assert!(skipped.tracking_checked_at.is_some());
    }
}

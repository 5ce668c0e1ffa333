//! Which notifications an order event produces, and their dispatch.
//!
//! | Event               | Notifications                                                                          |
//! |---------------------|----------------------------------------------------------------------------------------|
//! | order created       | in-app if the shopper chose app delivery, otherwise email when confirmations are on     |
//! | fulfillment created | always in-app; email too, unless suppression is on and the shopper chose app delivery |
//! | delivered           | once per fulfillment, when delivery updates are on                                     |
//! | order cancelled     | always                                                                                 |
//!
//! Every notification has a dedupe key, so a replayed webhook finds the existing row instead of creating another.
//! A notification is persisted before it is dispatched. If dispatch fails it stays pending for
//! [`NotificationApi::sweep_pending`].
use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use log::*;
use serde_json::json;

use crate::{
    db_types::{Fulfillment, NewNotification, Notification, NotificationChannel, NotificationType, Order, Store, StoreSettings},
    events::{EventProducers, NotificationSentEvent},
    sync_api::errors::NotificationError,
    traits::{NotificationDatabase, SyncDatabase},
};

pub const DEFAULT_SWEEP_BATCH: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderEvent {
    OrderCreated,
    FulfillmentCreated,
    Delivered,
    OrderCancelled,
}

impl OrderEvent {
    pub fn notification_type(&self) -> NotificationType {
        match self {
            Self::OrderCreated => NotificationType::OrderConfirmation,
            Self::FulfillmentCreated => NotificationType::OrderShipped,
            Self::Delivered => NotificationType::OrderDelivered,
            Self::OrderCancelled => NotificationType::OrderCancelled,
        }
    }
}

/// The channels to notify on for an event. An empty list means the event is silent for this store.
pub fn channels_for(event: OrderEvent, settings: &StoreSettings, receive_in_app: bool) -> Vec<NotificationChannel> {
    let preferred = if receive_in_app { NotificationChannel::InApp } else { NotificationChannel::Email };
    match event {
        OrderEvent::OrderCreated if receive_in_app => vec![NotificationChannel::InApp],
        OrderEvent::OrderCreated if settings.send_order_confirmations => vec![NotificationChannel::Email],
        OrderEvent::OrderCreated => vec![],
        OrderEvent::FulfillmentCreated => {
            let suppress_email = settings.suppress_shopify_notifications_for_beeylo_orders && receive_in_app;
            if suppress_email || !settings.send_shipping_updates {
                vec![NotificationChannel::InApp]
            } else {
                vec![NotificationChannel::InApp, NotificationChannel::Email]
            }
        },
        OrderEvent::Delivered if settings.send_delivery_updates => vec![preferred],
        OrderEvent::Delivered => vec![],
        OrderEvent::OrderCancelled => vec![preferred],
    }
}

pub fn dedupe_key(event: OrderEvent, channel: NotificationChannel, order: &Order, fulfillment: Option<&Fulfillment>) -> String {
    let kind = event.notification_type();
    match (event, fulfillment) {
        (OrderEvent::FulfillmentCreated | OrderEvent::Delivered, Some(f)) => format!("{kind}:{channel}:fulfillment:{}", f.id),
        _ => format!("{kind}:{channel}:order:{}", order.id),
    }
}

fn content(event: OrderEvent, order: &Order, fulfillment: Option<&Fulfillment>) -> (String, String, serde_json::Value) {
    let number = order.display_number();
    match event {
        OrderEvent::OrderCreated => (
            format!("Order Confirmed - {number}"),
            "Your order has been confirmed and is being prepared for shipment.".to_string(),
            json!({
                "order_number": number,
                "total_price": order.total_price,
                "currency": order.currency,
                "line_items": order.line_items,
            }),
        ),
        OrderEvent::FulfillmentCreated => (
            format!("Order Shipped - {number}"),
            "Your order is on its way! Track your package using the tracking number below.".to_string(),
            json!({
                "order_number": number,
                "tracking_number": fulfillment.and_then(|f| f.tracking_number.clone()),
                "tracking_company": fulfillment.and_then(|f| f.tracking_company.clone()),
                "tracking_url": fulfillment.and_then(|f| f.tracking_url.clone()),
                "estimated_delivery": fulfillment.and_then(|f| f.estimated_delivery),
            }),
        ),
        OrderEvent::Delivered => (
            format!("Order Delivered - {number}"),
            "Your order has been delivered! We hope you enjoy your purchase.".to_string(),
            json!({
                "order_number": number,
                "delivery_timestamp": fulfillment.and_then(|f| f.actual_delivery),
            }),
        ),
        OrderEvent::OrderCancelled => (
            format!("Order Cancelled - {number}"),
            "Your order has been cancelled. If you have any questions, please contact support.".to_string(),
            json!({
                "order_number": number,
                "cancelled_at": order.cancelled_at,
            }),
        ),
    }
}

/// Delivers a stored notification to its recipient.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Delivers notifications to the recipient's app inbox.
pub struct InboxSink<B> {
    db: B,
}

impl<B> InboxSink<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

#[async_trait]
impl<B: NotificationDatabase> NotificationSink for InboxSink<B> {
    async fn deliver(&self, notification: &Notification) -> Result<(), NotificationError> {
        self.db.record_inbox_entry(notification).await?;
        trace!("🔔️ Notification #{} added to the inbox of user {:?}", notification.id, notification.user_id);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub pending: usize,
    pub sent: usize,
}

pub struct NotificationApi<B> {
    db: B,
    sink: Arc<dyn NotificationSink>,
    producers: EventProducers,
}

impl<B> Debug for NotificationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NotificationApi")
    }
}

impl<B: Clone> Clone for NotificationApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), sink: Arc::clone(&self.sink), producers: self.producers.clone() }
    }
}

impl<B> NotificationApi<B>
where B: SyncDatabase + NotificationDatabase
{
    /// A dispatcher that delivers to the app inbox.
    pub fn new(db: B, producers: EventProducers) -> Self {
        let sink = Arc::new(InboxSink::new(db.clone()));
        Self { db, sink, producers }
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    pub async fn notify_order_created(&self, store: &Store, order: &Order) -> Result<Vec<Notification>, NotificationError> {
        self.notify(OrderEvent::OrderCreated, store, order, None).await
    }

    pub async fn notify_fulfillment_created(
        &self,
        store: &Store,
        order: &Order,
        fulfillment: &Fulfillment,
    ) -> Result<Vec<Notification>, NotificationError> {
        self.notify(OrderEvent::FulfillmentCreated, store, order, Some(fulfillment)).await
    }

    pub async fn notify_delivered(
        &self,
        store: &Store,
        order: &Order,
        fulfillment: &Fulfillment,
    ) -> Result<Vec<Notification>, NotificationError> {
        self.notify(OrderEvent::Delivered, store, order, Some(fulfillment)).await
    }

    pub async fn notify_cancelled(&self, store: &Store, order: &Order) -> Result<Vec<Notification>, NotificationError> {
        self.notify(OrderEvent::OrderCancelled, store, order, None).await
    }

    /// Creates the notifications the event calls for and dispatches each new one. Returns the newly created
    /// notifications; ones that already existed for this event are left alone.
    pub async fn notify(
        &self,
        event: OrderEvent,
        store: &Store,
        order: &Order,
        fulfillment: Option<&Fulfillment>,
    ) -> Result<Vec<Notification>, NotificationError> {
        let channels = channels_for(event, &store.settings, order.receive_in_app);
        if channels.is_empty() {
            debug!("🔔️ {event:?} on order #{} is silent for store {}", order.id, store.id);
            return Ok(Vec::new());
        }
        let user_id = self.recipient(order).await;
        let (title, message, payload) = content(event, order, fulfillment);
        let template_id = match event {
            OrderEvent::OrderCancelled => None,
            _ => store.settings.notification_template_id.clone(),
        };
        let mut created = Vec::with_capacity(channels.len());
        for channel in channels {
            let notification = NewNotification {
                order_id: order.id,
                customer_id: order.customer_id,
                user_id,
                notification_type: event.notification_type(),
                channel,
                title: title.clone(),
                message: message.clone(),
                payload: payload.clone(),
                template_id: template_id.clone(),
                dedupe_key: dedupe_key(event, channel, order, fulfillment),
            };
            let (stored, is_new) = self.db.create_notification(notification).await?;
            if !is_new {
                trace!("🔔️ {} already exists as #{}", stored.dedupe_key, stored.id);
                continue;
            }
            info!("🔔️ Created {} {} notification #{} for order #{}", channel, stored.notification_type, stored.id, order.id);
            let sent = self.dispatch(&stored).await;
            created.push(if sent { Notification { sent: true, ..stored } } else { stored });
        }
        Ok(created)
    }

    async fn recipient(&self, order: &Order) -> Option<i64> {
        let customer_id = order.customer_id?;
        match self.db.fetch_customer(customer_id).await {
            Ok(customer) => customer.and_then(|c| c.user_id),
            Err(e) => {
                warn!("🔔️ Could not look up customer #{customer_id}. Notifying without a recipient. {e}");
                None
            },
        }
    }

    /// Delivers the notification and marks it sent. Failures are logged and leave the notification pending.
    pub async fn dispatch(&self, notification: &Notification) -> bool {
        if let Err(e) = self.sink.deliver(notification).await {
            warn!("🔔️ Notification #{} could not be delivered. It will be retried. {e}", notification.id);
            return false;
        }
        match self.db.mark_notification_sent(notification.id).await {
            Ok(sent) => {
                self.producers.publish_notification_sent(NotificationSentEvent::new(sent)).await;
                true
            },
            Err(e) => {
                warn!("🔔️ Notification #{} was delivered but could not be marked sent. {e}", notification.id);
                false
            },
        }
    }

    /// Retries delivery for up to `limit` pending notifications, oldest first.
    pub async fn sweep_pending(&self, limit: u32) -> Result<SweepSummary, NotificationError> {
        let pending = self.db.fetch_pending_notifications(limit).await?;
        let mut summary = SweepSummary { pending: pending.len(), sent: 0 };
        for notification in &pending {
            if self.dispatch(notification).await {
                summary.sent += 1;
            }
        }
        if summary.pending > 0 {
            info!("🔔️ Notification sweep sent {} of {} pending notifications", summary.sent, summary.pending);
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod test {
    use shopify_tools::ShopifyOrder;

    use super::*;
    use crate::{
        sync_api::SyncApi,
        test_utils::{
            fixtures::{insert_test_store, order_payload},
            prepare_env::{prepare_test_env, random_db_path},
        },
        SqliteDatabase,
    };

    fn settings(suppress: bool) -> StoreSettings {
        StoreSettings { suppress_shopify_notifications_for_beeylo_orders: suppress, ..StoreSettings::default() }
    }

    #[test]
    fn decision_table() {
        use NotificationChannel::*;
        use OrderEvent::*;
        let on = settings(true);
        assert_eq!(channels_for(OrderCreated, &on, true), vec![InApp]);
        assert_eq!(channels_for(OrderCreated, &on, false), vec![Email]);
        let quiet = StoreSettings { send_order_confirmations: false, ..on.clone() };
        assert!(channels_for(OrderCreated, &quiet, false).is_empty());

        assert_eq!(channels_for(FulfillmentCreated, &on, true), vec![InApp]);
        assert_eq!(channels_for(FulfillmentCreated, &on, false), vec![InApp, Email]);
        assert_eq!(channels_for(FulfillmentCreated, &settings(false), true), vec![InApp, Email]);

        assert_eq!(channels_for(Delivered, &on, true), vec![InApp]);
        let no_delivery = StoreSettings { send_delivery_updates: false, ..on.clone() };
        assert!(channels_for(Delivered, &no_delivery, true).is_empty());

        let nothing = StoreSettings {
            send_order_confirmations: false,
            send_shipping_updates: false,
            send_delivery_updates: false,
            ..on
        };
        assert_eq!(channels_for(OrderCancelled, &nothing, false), vec![Email]);
    }

    async fn setup(
        suppress: bool,
        receive_in_app: bool,
    ) -> (SqliteDatabase, Store, Order, Fulfillment) {
        let db = prepare_test_env(&random_db_path()).await;
        let store = insert_test_store(&db, settings(suppress)).await;
        let mut payload = order_payload("123", "a@x.com", receive_in_app);
        payload["fulfillments"] = serde_json::json!([{"id": 1, "tracking_company": "DHL", "tracking_number": "JD1"}]);
        let order: ShopifyOrder = serde_json::from_value(payload).unwrap();
        let synced = SyncApi::new(db.clone()).sync_order(store.id, &order, None).await.unwrap();
        let fulfillment = synced.fulfillments[0].clone();
        (db, store, synced.order, fulfillment)
    }

    #[tokio::test]
    async fn suppressed_app_order_gets_one_in_app_shipping_notice() {
        let (db, store, order, fulfillment) = setup(true, true).await;
        let api = NotificationApi::new(db.clone(), EventProducers::default());
        let created = api.notify_fulfillment_created(&store, &order, &fulfillment).await.unwrap();
        // The same webhook again
        let replay = api.notify_fulfillment_created(&store, &order, &fulfillment).await.unwrap();
        assert!(replay.is_empty());
        assert_eq!(created.len(), 1);
        let all = db.fetch_notifications_for_order(order.id).await.unwrap();
        let shipped: Vec<_> = all.iter().filter(|n| n.notification_type == NotificationType::OrderShipped).collect();
        assert_eq!(shipped.len(), 1);
        assert_eq!(shipped[0].channel, NotificationChannel::InApp);
        assert!(shipped[0].sent);
        assert!(all.iter().all(|n| n.channel != NotificationChannel::Email));
    }

    #[tokio::test]
    async fn delivered_notice_is_sent_once() {
        let (db, store, order, fulfillment) = setup(true, true).await;
        let api = NotificationApi::new(db.clone(), EventProducers::default());
        assert_eq!(api.notify_delivered(&store, &order, &fulfillment).await.unwrap().len(), 1);
        assert!(api.notify_delivered(&store, &order, &fulfillment).await.unwrap().is_empty());
        let delivered = db
            .fetch_notifications_for_order(order.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|n| n.notification_type == NotificationType::OrderDelivered)
            .count();
        assert_eq!(delivered, 1);
    }

    #[tokio::test]
    async fn failed_dispatch_is_swept_later() {
        let (db, store, order, _) = setup(true, false).await;
        let mut failing = MockNotificationSink::new();
        failing.expect_deliver().returning(|_| Err(NotificationError::Delivery("push gateway down".into())));
        let api = NotificationApi::new(db.clone(), EventProducers::default()).with_sink(Arc::new(failing));
        let created = api.notify_cancelled(&store, &order).await.unwrap();
        assert_eq!(created.len(), 1);
        assert!(!created[0].sent);
        assert_eq!(db.fetch_pending_notifications(10).await.unwrap().len(), 1);

        let api = NotificationApi::new(db.clone(), EventProducers::default());
        let summary = api.sweep_pending(DEFAULT_SWEEP_BATCH).await.unwrap();
        assert_eq!(summary, SweepSummary { pending: 1, sent: 1 });
        assert!(db.fetch_pending_notifications(10).await.unwrap().is_empty());
    }
}

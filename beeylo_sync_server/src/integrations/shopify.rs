use std::sync::Arc;

use beeylo_sync_engine::{
    events::{AppDeliveryOrderEvent, EventHandlers, EventHooks, NotificationSentEvent},
    rate_limiter::{LimiterKey, RateLimiter},
    traits::StorefrontApi,
};
use log::*;

/// The tag added to Shopify orders whose shopper asked to follow the delivery in the Beeylo app.
pub const APP_DELIVERY_TAG: &str = "beeylo-app-delivery";
pub const SHOPIFY_EVENT_BUFFER_SIZE: usize = 25;

/// Builds the event hooks that call back into Shopify.
///
/// Every hook is fire-and-forget: failures are logged and never retried, and never hold up the sync. Admin API calls
/// share the store's key in `limiter` with every other call made for that store.
pub fn create_shopify_event_handlers(storefront: Arc<dyn StorefrontApi>, limiter: RateLimiter) -> EventHandlers {
    let mut hooks = EventHooks::default();
    // --- On AppDeliveryOrder Handler ---
    hooks.on_app_delivery_order(move |ev| {
        let AppDeliveryOrderEvent { store, order } = ev;
        let storefront = Arc::clone(&storefront);
        let limiter = limiter.clone();
        Box::pin(async move {
            let order_id = order.shopify_order_id.as_str();
            let tagged = limiter
                .schedule(LimiterKey::Store(store.id), storefront.add_order_tag(&store, order_id, APP_DELIVERY_TAG))
                .await;
            match tagged {
                Ok(Ok(())) => info!("🛍️ Order {order_id} on {} tagged as an app delivery", store.shop_domain),
                Ok(Err(e)) => warn!("🛍️ Could not tag order {order_id} on {} as an app delivery. {e}", store.shop_domain),
                Err(e) => warn!("🛍️ Order {order_id} on {} was not tagged. {e}", store.shop_domain),
            }
        })
    });
    // --- On NotificationSent Handler ---
    hooks.on_notification_sent(|ev| {
        let NotificationSentEvent { notification } = ev;
        Box::pin(async move {
            debug!(
                "🔔️ Notification #{} ({} via {}) sent for order #{}",
                notification.id, notification.notification_type, notification.channel, notification.order_id
            );
        })
    });
    EventHandlers::new(SHOPIFY_EVENT_BUFFER_SIZE, hooks)
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use beeylo_sync_engine::{
        db_types::Store,
        test_utils::{
            fixtures::{insert_test_store, order_payload},
            prepare_env::{prepare_test_env, random_db_path},
        },
        traits::StorefrontError,
        SyncApi,
    };
    use chrono::{DateTime, Utc};
    use shopify_tools::ShopifyOrder;

    use super::*;

    #[derive(Default)]
    struct TagRecorder {
        tags: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl StorefrontApi for TagRecorder {
        async fn fetch_orders(
            &self,
            _store: &Store,
            _since: Option<DateTime<Utc>>,
            _limit: u32,
        ) -> Result<Vec<ShopifyOrder>, StorefrontError> {
            Ok(vec![])
        }

        async fn add_order_tag(
            &self,
            _store: &Store,
            shopify_order_id: &str,
            tag: &str,
        ) -> Result<(), StorefrontError> {
            self.tags.lock().unwrap().push((shopify_order_id.to_string(), tag.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn app_delivery_orders_are_tagged() {
        let _ = env_logger::try_init();
        let db = prepare_test_env(&random_db_path()).await;
        let store = insert_test_store(&db, Default::default()).await;
        let payload = order_payload("5001", "ann@example.com", true);
        let shopify_order: ShopifyOrder = serde_json::from_value(payload).unwrap();
        let order = SyncApi::new(db).sync_order(store.id, &shopify_order, None).await.unwrap().order;

        let recorder = Arc::new(TagRecorder::default());
        let handlers = create_shopify_event_handlers(recorder.clone(), RateLimiter::default());
        let producers = handlers.producers();
        handlers.start_handlers();
        producers.publish_app_delivery_order(AppDeliveryOrderEvent::new(store, order)).await;
        drop(producers);
        for _ in 0..50 {
            if !recorder.tags.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let tags = recorder.tags.lock().unwrap().clone();
        assert_eq!(tags, vec![("5001".to_string(), APP_DELIVERY_TAG.to_string())]);
    }

    #[tokio::test]
    async fn tagging_waits_for_the_store_limiter() {
        let db = prepare_test_env(&random_db_path()).await;
        let store = insert_test_store(&db, Default::default()).await;
        let payload = order_payload("5002", "bob@example.com", true);
        let shopify_order: ShopifyOrder = serde_json::from_value(payload).unwrap();
        let order = SyncApi::new(db).sync_order(store.id, &shopify_order, None).await.unwrap().order;

        let limiter = RateLimiter::default();
        // Another call for the same store is in flight
        let busy = limiter.acquire(LimiterKey::Store(store.id)).await.unwrap();
        let recorder = Arc::new(TagRecorder::default());
        let handlers = create_shopify_event_handlers(recorder.clone(), limiter.clone());
        let producers = handlers.producers();
        handlers.start_handlers();
        producers.publish_app_delivery_order(AppDeliveryOrderEvent::new(store, order)).await;
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(recorder.tags.lock().unwrap().is_empty());

        drop(busy);
        for _ in 0..100 {
            if !recorder.tags.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(recorder.tags.lock().unwrap().len(), 1);
    }
}

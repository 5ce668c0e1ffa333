use std::{future::Future, pin::Pin, sync::Arc};

use log::*;

use crate::events::{AppDeliveryOrderEvent, EventHandler, EventProducer, Handler, NotificationSentEvent};

/// Cloned into every API that publishes events. Empty lists mean nobody is listening.
#[derive(Default, Clone)]
pub struct EventProducers {
    pub app_delivery_order_producer: Vec<EventProducer<AppDeliveryOrderEvent>>,
    pub notification_sent_producer: Vec<EventProducer<NotificationSentEvent>>,
}

impl EventProducers {
    pub async fn publish_app_delivery_order(&self, event: AppDeliveryOrderEvent) {
        for producer in &self.app_delivery_order_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_notification_sent(&self, event: NotificationSentEvent) {
        for producer in &self.notification_sent_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_app_delivery_order: Option<EventHandler<AppDeliveryOrderEvent>>,
    pub on_notification_sent: Option<EventHandler<NotificationSentEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_app_delivery_order = hooks.on_app_delivery_order.map(|f| EventHandler::new(buffer_size, f));
        let on_notification_sent = hooks.on_notification_sent.map(|f| EventHandler::new(buffer_size, f));
        Self { on_app_delivery_order, on_notification_sent }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_app_delivery_order {
            result.app_delivery_order_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_notification_sent {
            result.notification_sent_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns a task for each registered handler.
    pub fn start_handlers(self) {
        if let Some(handler) = self.on_app_delivery_order {
            debug!("📬️ Starting the app delivery order hook");
            tokio::spawn(handler.start_handler());
        }
        if let Some(handler) = self.on_notification_sent {
            debug!("📬️ Starting the notification sent hook");
            tokio::spawn(handler.start_handler());
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_app_delivery_order: Option<Handler<AppDeliveryOrderEvent>>,
    pub on_notification_sent: Option<Handler<NotificationSentEvent>>,
}

impl EventHooks {
    pub fn on_app_delivery_order<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(AppDeliveryOrderEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_app_delivery_order = Some(Arc::new(f));
        self
    }

    pub fn on_notification_sent<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(NotificationSentEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_notification_sent = Some(Arc::new(f));
        self
    }
}

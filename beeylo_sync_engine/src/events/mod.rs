//! Fire-and-forget hooks for side effects that must never hold up the sync path.
//!
//! The sync engine publishes events (an app-delivery order arrived, a notification was dispatched) and carries on.
//! Subscribers, such as the server's Shopify tagging hook or a push gateway, run on their own tasks and can only log
//! their failures.
mod channel;
mod event_types;
mod hooks;

pub use channel::{EventHandler, EventProducer, Handler};
pub use event_types::*;
pub use hooks::{EventHandlers, EventHooks, EventProducers};

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::db_types::{ConversionError, QueueName};

pub const DEFAULT_PRIORITY: i64 = 5;

/// A job that can be put on a queue. Lower priority values are served first.
pub trait JobPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    const QUEUE: QueueName;

    fn priority(&self) -> i64 {
        DEFAULT_PRIORITY
    }
}

/// The webhook topics the engine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Topic {
    OrdersCreate,
    OrdersUpdated,
    OrdersPaid,
    OrdersCancelled,
    OrdersFulfilled,
    FulfillmentsCreate,
    FulfillmentsUpdate,
    CustomersCreate,
    CustomersUpdate,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrdersCreate => "orders/create",
            Self::OrdersUpdated => "orders/updated",
            Self::OrdersPaid => "orders/paid",
            Self::OrdersCancelled => "orders/cancelled",
            Self::OrdersFulfilled => "orders/fulfilled",
            Self::FulfillmentsCreate => "fulfillments/create",
            Self::FulfillmentsUpdate => "fulfillments/update",
            Self::CustomersCreate => "customers/create",
            Self::CustomersUpdate => "customers/update",
        }
    }

    pub fn priority(&self) -> i64 {
        match self {
            Self::OrdersCreate => 1,
            Self::FulfillmentsCreate => 2,
            Self::FulfillmentsUpdate => 3,
            _ => DEFAULT_PRIORITY,
        }
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts `orders/create` as well as the path-friendly `orders-create` and `orders_create`.
impl FromStr for Topic {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', '_'], "/");
        match normalized.as_str() {
            "orders/create" => Ok(Self::OrdersCreate),
            "orders/updated" => Ok(Self::OrdersUpdated),
            "orders/paid" => Ok(Self::OrdersPaid),
            "orders/cancelled" => Ok(Self::OrdersCancelled),
            "orders/fulfilled" => Ok(Self::OrdersFulfilled),
            "fulfillments/create" => Ok(Self::FulfillmentsCreate),
            "fulfillments/update" => Ok(Self::FulfillmentsUpdate),
            "customers/create" => Ok(Self::CustomersCreate),
            "customers/update" => Ok(Self::CustomersUpdate),
            _ => Err(ConversionError::new("webhook topic", s)),
        }
    }
}

impl TryFrom<String> for Topic {
    type Error = ConversionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.as_str().to_string()
    }
}

/// A verified webhook delivery, waiting to be synced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookJob {
    pub store_id: i64,
    pub shop_domain: String,
    pub topic: Topic,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl JobPayload for WebhookJob {
    const QUEUE: QueueName = QueueName::Webhooks;

    fn priority(&self) -> i64 {
        self.topic.priority()
    }
}

/// A request to look up a shipment with its courier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingJob {
    pub store_id: i64,
    pub order_id: i64,
    pub fulfillment_id: i64,
    pub tracking_number: String,
    pub tracking_company: Option<String>,
}

impl JobPayload for TrackingJob {
    const QUEUE: QueueName = QueueName::Tracking;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn topics_parse_with_any_separator() {
        assert_eq!("orders/create".parse::<Topic>().unwrap(), Topic::OrdersCreate);
        assert_eq!("orders-create".parse::<Topic>().unwrap(), Topic::OrdersCreate);
        assert_eq!("FULFILLMENTS_UPDATE".parse::<Topic>().unwrap(), Topic::FulfillmentsUpdate);
        assert!("app/uninstalled".parse::<Topic>().is_err());
    }

    #[test]
    fn topic_priorities() {
        assert_eq!(Topic::OrdersCreate.priority(), 1);
        assert_eq!(Topic::FulfillmentsCreate.priority(), 2);
        assert_eq!(Topic::FulfillmentsUpdate.priority(), 3);
        assert_eq!(Topic::CustomersUpdate.priority(), 5);
    }

    #[test]
    fn webhook_job_serializes_topic_as_string() {
        let job = WebhookJob {
            store_id: 1,
            shop_domain: "a.myshopify.com".into(),
            topic: Topic::OrdersPaid,
            payload: serde_json::json!({"id": 1}),
            received_at: Utc::now(),
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["topic"], "orders/paid");
        let back: WebhookJob = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }
}

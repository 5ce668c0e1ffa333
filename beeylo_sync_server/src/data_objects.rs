use std::fmt::Display;

use beeylo_sync_engine::db_types::QueueName;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DEAD_LETTER_LIMIT: u32 = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

/// The reply to an accepted webhook. `job_id` is absent when the topic is not one the server acts on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAccepted {
    pub success: bool,
    pub job_id: Option<i64>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualSyncRequest {
    pub store_id: i64,
    #[serde(default)]
    pub since: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterQuery {
    pub queue: QueueName,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingRefreshRequest {
    pub fulfillment_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingRefreshResponse {
    pub fulfillment_id: i64,
    /// `None` if the fulfillment has no tracking number, an unknown carrier, or has already reached a final status.
    pub job_id: Option<i64>,
}

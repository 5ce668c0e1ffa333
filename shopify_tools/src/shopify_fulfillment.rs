use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    helpers::{lenient_id, lenient_timestamp, null_as_default, ShopifyId},
    LineItem,
};

/// A fulfillment as delivered by the `fulfillments/*` webhooks, or embedded in an order payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShopifyFulfillment {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<ShopifyId>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub order_id: Option<ShopifyId>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tracking_company: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tracking_numbers: Vec<String>,
    #[serde(default)]
    pub tracking_url: Option<String>,
    #[serde(default)]
    pub shipment_status: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub line_items: Vec<LineItem>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ShopifyFulfillment {
    /// The primary tracking number, falling back to the first entry of `tracking_numbers`.
    pub fn primary_tracking_number(&self) -> Option<String> {
        self.tracking_number
            .clone()
            .or_else(|| self.tracking_numbers.first().cloned())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    }
}

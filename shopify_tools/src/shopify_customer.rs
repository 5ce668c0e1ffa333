use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::helpers::{lenient_id, lenient_timestamp, ShopifyId};

/// A customer as delivered by the `customers/*` webhooks, or embedded in an order payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShopifyCustomer {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: Option<ShopifyId>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub orders_count: Option<Value>,
    #[serde(default)]
    pub total_spent: Option<Value>,
    #[serde(default)]
    pub verified_email: Option<bool>,
    #[serde(default)]
    pub tax_exempt: Option<bool>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ShopifyCustomer {
    /// Shopify stores tags as a single comma-separated string.
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .map(|t| t.split(',').map(str::trim).filter(|t| !t.is_empty()).map(String::from).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use super::ShopifyCustomer;

    #[test]
    fn tags_are_split() {
        let c: ShopifyCustomer =
            serde_json::from_str(r#"{"id": 1, "tags": "vip, newsletter,, beeylo"}"#).expect("customer");
        assert_eq!(c.tag_list(), vec!["vip", "newsletter", "beeylo"]);
    }
}

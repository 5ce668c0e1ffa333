use serde::{Deserialize, Serialize};

use crate::ShopifyOrder;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrdersResponse {
    #[serde(default)]
    pub orders: Vec<ShopifyOrder>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UserError {
    #[serde(default)]
    pub field: Option<Vec<String>>,
    pub message: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagsAddPayload {
    #[serde(default, rename = "userErrors")]
    pub user_errors: Vec<UserError>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagsAddResponse {
    #[serde(rename = "tagsAdd")]
    pub tags_add: Option<TagsAddPayload>,
}

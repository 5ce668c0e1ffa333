use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use graphql_parser::parse_query;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    config::ShopifyConfig,
    data_objects::{OrdersResponse, TagsAddResponse},
    ShopifyApiError,
    ShopifyOrder,
};

/// The most orders the REST API will return in one page.
pub const MAX_ORDERS_PER_PAGE: u32 = 250;

#[derive(Clone)]
pub struct ShopifyApi {
    config: ShopifyConfig,
    base_url: Option<String>,
    client: Arc<Client>,
}

impl ShopifyApi {
    pub fn new(config: ShopifyConfig) -> Result<Self, ShopifyApiError> {
        let mut headers = HeaderMap::with_capacity(2);
        let val = HeaderValue::from_str(config.admin_access_token.reveal().as_str())
            .map_err(|e| ShopifyApiError::Initialization(e.to_string()))?;
        headers.insert("X-Shopify-Access-Token", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| ShopifyApiError::Initialization(e.to_string()))?;
        Ok(Self { config, base_url: None, client: Arc::new(client) })
    }

    /// Sends requests to `base_url` instead of `https://{shop}`. Useful behind a proxy, and in tests.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    pub fn shop(&self) -> &str {
        self.config.shop.as_str()
    }

    pub async fn rest_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        body: Option<B>,
    ) -> Result<T, ShopifyApiError> {
        let url = self.url(path);
        trace!("🛍️ Sending REST query: {url}");
        let mut req = self.client.request(method, url);
        if !params.is_empty() {
            req = req.query(params);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }
        let response = req.send().await.map_err(|e| ShopifyApiError::RestResponseError(e.to_string()))?;
        if response.status().is_success() {
            trace!("🛍️ REST query successful. {}", response.status());
            response.json::<T>().await.map_err(|e| ShopifyApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.map_err(|e| ShopifyApiError::RestResponseError(e.to_string()))?;
            Err(ShopifyApiError::QueryError { status, message })
        }
    }

    pub async fn graphql_query<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: Option<Value>,
    ) -> Result<T, ShopifyApiError> {
        let query = parse_query::<String>(query).map_err(|e| ShopifyApiError::InvalidGraphQL(e.to_string()))?;
        let mut body = serde_json::json!({
            "query": query.to_string(),
        });
        if let Some(vars) = variables {
            body["variables"] = vars;
        }
        trace!("🛍️ Sending GraphQL query: {body}");
        let result = self.rest_query::<Value, Value>(Method::POST, "/graphql.json", &[], Some(body)).await?;
        if let Some(errors) = result["errors"].as_array() {
            let e = errors.iter().map(|e| e.to_string()).collect::<Vec<String>>().join(", ");
            return Err(ShopifyApiError::GraphQLError(e));
        }
        let data = result["data"].clone();
        trace!("🛍️ GraphQL costs: {}", result["extensions"]["cost"]);
        if data.is_null() {
            return Err(ShopifyApiError::EmptyResponse);
        }
        serde_json::from_value(data).map_err(|e| ShopifyApiError::JsonError(e.to_string()))
    }

    pub fn url(&self, path: &str) -> String {
        match &self.base_url {
            Some(base) => format!("{base}/admin/api/{}{path}", self.config.api_version),
            None => format!("https://{}/admin/api/{}{path}", self.config.shop, self.config.api_version),
        }
    }

    /// Fetches up to `limit` orders in any status, optionally only those created at or after `since`.
    pub async fn fetch_orders(
        &self,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<ShopifyOrder>, ShopifyApiError> {
        let limit = limit.clamp(1, MAX_ORDERS_PER_PAGE).to_string();
        let since = since.map(|s| s.to_rfc3339_opts(SecondsFormat::Secs, true));
        let mut params = vec![("status", "any"), ("limit", limit.as_str())];
        if let Some(since) = since.as_deref() {
            params.push(("created_at_min", since));
        }
        debug!("🛍️ Fetching orders for {} ({params:?})", self.config.shop);
        let result = self.rest_query::<OrdersResponse, ()>(Method::GET, "/orders.json", &params, None).await?;
        info!("🛍️ Fetched {} orders from {}", result.orders.len(), self.config.shop);
        Ok(result.orders)
    }

    /// Adds tags to an order using the `tagsAdd` mutation. Existing tags are left in place.
    pub async fn add_order_tags(&self, order_id: &str, tags: &[&str]) -> Result<(), ShopifyApiError> {
        let mutation = r#"
        mutation addTags($id: ID!, $tags: [String!]!) {
          tagsAdd(id: $id, tags: $tags) {
            node { id }
            userErrors { field message }
          }
        }"#;
        let variables = serde_json::json!({
            "id": format!("gid://shopify/Order/{order_id}"),
            "tags": tags,
        });
        debug!("🛍️ Tagging order {order_id} on {} with {tags:?}", self.config.shop);
        let response = self.graphql_query::<TagsAddResponse>(mutation, Some(variables)).await?;
        let errors = response.tags_add.map(|p| p.user_errors).unwrap_or_default();
        if !errors.is_empty() {
            let e = errors.iter().map(|e| e.message.as_str()).collect::<Vec<&str>>().join(", ");
            return Err(ShopifyApiError::GraphQLError(e));
        }
        info!("🛍️ Order {order_id} tagged with {tags:?}");
        Ok(())
    }
}

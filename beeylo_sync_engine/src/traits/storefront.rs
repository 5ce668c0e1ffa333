use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shopify_tools::{ShopifyApi, ShopifyApiError, ShopifyConfig, ShopifyOrder};
use thiserror::Error;

use crate::db_types::Store;

#[derive(Debug, Clone, Error)]
pub enum StorefrontError {
    #[error("Storefront request was throttled or failed temporarily: {0}")]
    Transient(String),
    #[error("Storefront request failed: {0}")]
    Failed(String),
}

impl From<ShopifyApiError> for StorefrontError {
    fn from(e: ShopifyApiError) -> Self {
        if e.is_transient() {
            Self::Transient(e.to_string())
        } else {
            Self::Failed(e.to_string())
        }
    }
}

/// The calls the sync engine makes back into a tenant's storefront.
#[async_trait]
pub trait StorefrontApi: Send + Sync + 'static {
    async fn fetch_orders(
        &self,
        store: &Store,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<ShopifyOrder>, StorefrontError>;

    async fn add_order_tag(&self, store: &Store, shopify_order_id: &str, tag: &str) -> Result<(), StorefrontError>;
}

/// Talks to the Shopify Admin API using each store's own access token.
#[derive(Debug, Clone)]
pub struct ShopifyStorefront {
    api_version: String,
    base_url: Option<String>,
}

impl ShopifyStorefront {
    pub fn new(api_version: &str) -> Self {
        Self { api_version: api_version.to_string(), base_url: None }
    }

    /// Overrides the `https://{shop}` prefix for every store.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = Some(base_url.to_string());
        self
    }

    fn client_for(&self, store: &Store) -> Result<ShopifyApi, StorefrontError> {
        let config = ShopifyConfig::new(&store.shop_domain, store.access_token.clone(), &self.api_version);
        let api = ShopifyApi::new(config)?;
        Ok(match &self.base_url {
            Some(url) => api.with_base_url(url),
            None => api,
        })
    }
}

#[async_trait]
impl StorefrontApi for ShopifyStorefront {
    async fn fetch_orders(
        &self,
        store: &Store,
        since: Option<DateTime<Utc>>,
        limit: u32,
    ) -> Result<Vec<ShopifyOrder>, StorefrontError> {
        let api = self.client_for(store)?;
        Ok(api.fetch_orders(since, limit).await?)
    }

    async fn add_order_tag(&self, store: &Store, shopify_order_id: &str, tag: &str) -> Result<(), StorefrontError> {
        let api = self.client_for(store)?;
        Ok(api.add_order_tags(shopify_order_id, &[tag]).await?)
    }
}

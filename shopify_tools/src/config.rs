use beeylo_common::Secret;
use log::*;

pub const DEFAULT_SHOPIFY_API_VERSION: &str = "2024-04";

/// Connection details for one tenant store. Every connected store has its own domain and offline access token, so
/// a `ShopifyConfig` is built per store rather than once per process.
#[derive(Debug, Clone, Default)]
pub struct ShopifyConfig {
    pub shop: String,
    pub admin_access_token: Secret<String>,
    pub api_version: String,
}

impl ShopifyConfig {
    pub fn new(shop: &str, admin_access_token: Secret<String>, api_version: &str) -> Self {
        Self { shop: shop.to_string(), admin_access_token, api_version: api_version.to_string() }
    }

    /// Reads the Admin API version from `BSYNC_SHOPIFY_API_VERSION`.
    pub fn api_version_from_env_or_default() -> String {
        std::env::var("BSYNC_SHOPIFY_API_VERSION").unwrap_or_else(|_| {
            warn!("BSYNC_SHOPIFY_API_VERSION not set, using {DEFAULT_SHOPIFY_API_VERSION} as default");
            DEFAULT_SHOPIFY_API_VERSION.to_string()
        })
    }
}

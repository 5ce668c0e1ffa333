use async_trait::async_trait;
use beeylo_sync_engine::{
    db_types::Store,
    traits::{StorefrontApi, StorefrontError},
};
use chrono::{DateTime, Utc};
use mockall::mock;
use shopify_tools::ShopifyOrder;

mock! {
    pub Storefront {}
    #[async_trait]
    impl StorefrontApi for Storefront {
        async fn fetch_orders(&self, store: &Store, since: Option<DateTime<Utc>>, limit: u32) -> Result<Vec<ShopifyOrder>, StorefrontError>;
        async fn add_order_tag(&self, store: &Store, shopify_order_id: &str, tag: &str) -> Result<(), StorefrontError>;
    }
}

use async_trait::async_trait;

use crate::{
    db_types::{
        AppUser,
        Customer,
        Fulfillment,
        NewCustomer,
        NewFulfillment,
        NewOrder,
        NewStore,
        Order,
        Store,
        StoreSettings,
        UserType,
    },
    traits::StoreError,
};

/// Idempotent upserts and lookups for tenants, orders, customers and fulfillments.
///
/// Every `upsert_*` method is keyed on the storefront's identifiers and is last-write-wins on all other fields, so
/// replaying the same payload any number of times leaves the same row behind.
#[async_trait]
pub trait SyncDatabase: Clone + Send + Sync + 'static {
    fn url(&self) -> &str;

    async fn insert_store(&self, store: NewStore) -> Result<Store, StoreError>;

    async fn fetch_store(&self, id: i64) -> Result<Option<Store>, StoreError>;

    /// Fetches an active store by its `*.myshopify.com` domain.
    async fn fetch_store_by_domain(&self, shop_domain: &str) -> Result<Option<Store>, StoreError>;

    async fn update_store_settings(&self, id: i64, settings: StoreSettings) -> Result<Store, StoreError>;

    /// Upserts on `(store_id, shopify_order_id)`.
    async fn upsert_order(&self, order: NewOrder) -> Result<Order, StoreError>;

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, StoreError>;

    async fn fetch_order_by_shopify_id(&self, store_id: i64, shopify_order_id: &str)
        -> Result<Option<Order>, StoreError>;

    /// Upserts on `(store_id, shopify_customer_id)`. An existing user link is preserved.
    async fn upsert_customer(&self, customer: NewCustomer) -> Result<Customer, StoreError>;

    async fn fetch_customer(&self, id: i64) -> Result<Option<Customer>, StoreError>;

    async fn fetch_unlinked_customers(&self, store_id: i64) -> Result<Vec<Customer>, StoreError>;

    /// Upserts on `(order_id, shopify_fulfillment_id)`. Tracking-derived fields are preserved.
    async fn upsert_fulfillment(&self, fulfillment: NewFulfillment) -> Result<Fulfillment, StoreError>;

    async fn fetch_fulfillment(&self, id: i64) -> Result<Option<Fulfillment>, StoreError>;

    async fn fetch_fulfillments_for_order(&self, order_id: i64) -> Result<Vec<Fulfillment>, StoreError>;

    async fn insert_app_user(&self, email: &str, user_type: UserType) -> Result<AppUser, StoreError>;

    /// Finds an app account that may be linked to a storefront customer, by exact (case-insensitive) email.
    async fn find_eligible_user_by_email(&self, email: &str) -> Result<Option<AppUser>, StoreError>;

    /// Links the customer to the user, but only if the customer is not linked yet. Returns `true` if the link was
    /// made by this call.
    async fn link_customer_to_user(&self, customer_id: i64, user_id: i64) -> Result<bool, StoreError>;
}

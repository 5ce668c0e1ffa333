//! Shopify Admin API client and webhook payload types used by the Beeylo sync engine.
mod api;
mod config;
mod error;
mod shopify_customer;
mod shopify_fulfillment;
mod shopify_order;

pub mod data_objects;
pub mod helpers;

pub use api::ShopifyApi;
pub use config::ShopifyConfig;
pub use error::ShopifyApiError;
pub use shopify_customer::ShopifyCustomer;
pub use shopify_fulfillment::ShopifyFulfillment;
pub use shopify_order::{Address, LineItem, NoteAttribute, ShopifyOrder};

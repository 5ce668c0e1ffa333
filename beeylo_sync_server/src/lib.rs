//! # Beeylo sync server
//! The HTTP face of the sync engine. It is responsible for:
//! * Receiving Shopify webhooks, checking their signatures, and putting them on the webhook queue.
//! * Running the webhook and tracking worker pools that drain the queues.
//! * Running the background tasks: notification retries, shipment rechecks, queue purges and rate limiter eviction.
//! * Calling back into Shopify when the engine asks for it (tagging app-delivery orders).
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `GET /health`: returns 200 OK.
//! * `POST /webhooks/{topic}`: Shopify webhooks, e.g. `/webhooks/orders-create`. Signed with the app's API secret.
//! * `POST /api/sync`: pulls a store's orders from Shopify and syncs them.
//! * `GET /api/dead_letters?queue=webhooks`: lists jobs that ran out of attempts.
//! * `POST /api/tracking/refresh`: queues an immediate tracking lookup for a fulfillment.
//!
//! The `/api` routes require `Authorization: Bearer <BSYNC_ADMIN_TOKEN>` when a token is configured.

pub mod background;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod integrations;
pub mod middleware;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;

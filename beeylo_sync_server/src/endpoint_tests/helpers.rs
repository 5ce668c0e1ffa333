use std::sync::Arc;

use actix_http::Request;
use actix_web::{
    body::MessageBody,
    dev::{Service, ServiceResponse},
    http::StatusCode,
    test,
};
use beeylo_common::Secret;
use beeylo_sync_engine::{
    helpers::calculate_hmac,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::StorefrontApi,
    SqliteDatabase,
};
use log::debug;

use crate::{config::ServerConfig, server::SyncServices};

// Test credentials only. DO NOT re-use them anywhere.
pub const TEST_API_SECRET: &str = "shpss_0123456789abcdef";
pub const TEST_ADMIN_TOKEN: &str = "admin-token-for-tests";

pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.shopify.api_secret = Secret::from(TEST_API_SECRET);
    config.admin_token = Some(Secret::from(TEST_ADMIN_TOKEN));
    config
}

/// A fresh database and the services built on top of it.
pub async fn test_services(config: &ServerConfig, storefront: Arc<dyn StorefrontApi>) -> (SqliteDatabase, SyncServices) {
    let db = prepare_test_env(&random_db_path()).await;
    let services = SyncServices::new(config, db.clone(), storefront);
    (db, services)
}

pub fn sign(body: &[u8]) -> String {
    calculate_hmac(TEST_API_SECRET.as_bytes(), body)
}

pub fn bearer() -> (&'static str, String) {
    ("Authorization", format!("Bearer {TEST_ADMIN_TOKEN}"))
}

/// Sends the request and returns the status and body. Errors raised by middleware become their error responses.
pub async fn send<S, B>(app: &S, req: Request) -> (StatusCode, String)
where
    S: Service<Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    debug!("Making request");
    match test::try_call_service(app, req).await {
        Ok(res) => {
            let status = res.status();
            let body = test::read_body(res).await;
            (status, String::from_utf8_lossy(&body).into_owned())
        },
        Err(e) => {
            let res = e.error_response();
            (res.status(), e.to_string())
        },
    }
}

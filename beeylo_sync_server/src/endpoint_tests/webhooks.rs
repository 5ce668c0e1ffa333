use std::sync::Arc;

use actix_web::{http::StatusCode, test, test::TestRequest, App};
use beeylo_sync_engine::{
    db_types::QueueName,
    helpers::SHOPIFY_HMAC_HEADER,
    queue::{Topic, WebhookJob},
    test_utils::fixtures::{insert_test_store, order_payload, TEST_SHOP},
    traits::JobBroker,
};
use serde_json::Value;

use super::{
    helpers::{send, sign, test_config, test_services},
    mocks::MockStorefront,
};
use crate::{routes::SHOP_DOMAIN_HEADER, server::configure_routes};

fn webhook_request(topic: &str, shop: &str, body: &[u8], signature: &str) -> actix_http::Request {
    TestRequest::post()
        .uri(&format!("/webhooks/{topic}"))
        .insert_header((SHOPIFY_HMAC_HEADER, signature))
        .insert_header((SHOP_DOMAIN_HEADER, shop))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body.to_vec())
        .to_request()
}

#[actix_web::test]
async fn signed_webhook_is_queued() {
    let config = test_config();
    let (db, services) = test_services(&config, Arc::new(MockStorefront::new())).await;
    let store = insert_test_store(&db, Default::default()).await;
    let queue = services.queue.clone();
    let app = test::init_service(App::new().configure(|cfg| configure_routes(cfg, &config, &services))).await;

    let body = order_payload("820982911946154508", "jon@example.com", true).to_string();
    let req = webhook_request("orders-create", TEST_SHOP, body.as_bytes(), &sign(body.as_bytes()));
    let (status, reply) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "{reply}");

    let reply: Value = serde_json::from_str(&reply).unwrap();
    let job_id = reply["job_id"].as_i64().expect("a job id");
    let job = queue.fetch_job(job_id).await.unwrap().expect("the job was stored");
    assert_eq!(job.queue, QueueName::Webhooks);
    assert_eq!(job.priority, 1);
    let payload: WebhookJob = serde_json::from_str(&job.payload).unwrap();
    assert_eq!(payload.store_id, store.id);
    assert_eq!(payload.topic, Topic::OrdersCreate);
    assert_eq!(payload.payload["id"], "820982911946154508");
}

#[actix_web::test]
async fn bad_signatures_are_rejected_before_queueing() {
    let config = test_config();
    let (db, services) = test_services(&config, Arc::new(MockStorefront::new())).await;
    insert_test_store(&db, Default::default()).await;
    let app = test::init_service(App::new().configure(|cfg| configure_routes(cfg, &config, &services))).await;

    let body = order_payload("1001", "jon@example.com", false).to_string();
    let forged = sign(b"some other body");
    let (status, _) = send(&app, webhook_request("orders-create", TEST_SHOP, body.as_bytes(), &forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = TestRequest::post()
        .uri("/webhooks/orders-create")
        .insert_header((SHOP_DOMAIN_HEADER, TEST_SHOP))
        .set_payload(body.clone())
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert!(db.next_available_at(QueueName::Webhooks).await.unwrap().is_none());
}

#[actix_web::test]
async fn signature_checks_can_be_disabled() {
    let mut config = test_config();
    config.shopify.hmac_checks = false;
    let (db, services) = test_services(&config, Arc::new(MockStorefront::new())).await;
    insert_test_store(&db, Default::default()).await;
    let app = test::init_service(App::new().configure(|cfg| configure_routes(cfg, &config, &services))).await;

    let body = order_payload("1002", "jon@example.com", false).to_string();
    let (status, _) = send(&app, webhook_request("orders-paid", TEST_SHOP, body.as_bytes(), "unsigned")).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn unknown_topics_are_acknowledged_and_dropped() {
    let config = test_config();
    let (db, services) = test_services(&config, Arc::new(MockStorefront::new())).await;
    insert_test_store(&db, Default::default()).await;
    let app = test::init_service(App::new().configure(|cfg| configure_routes(cfg, &config, &services))).await;

    let body = br#"{"id": 1}"#;
    let (status, reply) = send(&app, webhook_request("app-uninstalled", TEST_SHOP, body, &sign(body))).await;
    assert_eq!(status, StatusCode::OK);
    let reply: Value = serde_json::from_str(&reply).unwrap();
    assert!(reply["job_id"].is_null());
    assert!(db.next_available_at(QueueName::Webhooks).await.unwrap().is_none());
}

#[actix_web::test]
async fn unknown_shops_are_not_found() {
    let config = test_config();
    let (db, services) = test_services(&config, Arc::new(MockStorefront::new())).await;
    insert_test_store(&db, Default::default()).await;
    let app = test::init_service(App::new().configure(|cfg| configure_routes(cfg, &config, &services))).await;

    let body = order_payload("1003", "jon@example.com", false).to_string();
    let req = webhook_request("orders-create", "stranger.myshopify.com", body.as_bytes(), &sign(body.as_bytes()));
    let (status, reply) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(reply.contains("stranger.myshopify.com"));
}

#[actix_web::test]
async fn malformed_requests_are_bad_requests() {
    let config = test_config();
    let (db, services) = test_services(&config, Arc::new(MockStorefront::new())).await;
    insert_test_store(&db, Default::default()).await;
    let app = test::init_service(App::new().configure(|cfg| configure_routes(cfg, &config, &services))).await;

    let body = b"{not json";
    let (status, _) = send(&app, webhook_request("orders-create", TEST_SHOP, body, &sign(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = br#"{"id": 1}"#;
    let req = TestRequest::post()
        .uri("/webhooks/orders-create")
        .insert_header((SHOPIFY_HMAC_HEADER, sign(body)))
        .set_payload(body.to_vec())
        .to_request();
    let (status, reply) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(reply.contains(SHOP_DOMAIN_HEADER));
}

use std::sync::Arc;

use actix_web::{http::StatusCode, test, test::TestRequest, App};
use beeylo_sync_engine::{
    db_types::QueueName,
    queue::{EnqueueOptions, TrackingJob},
    test_utils::fixtures::{fulfillment_payload, insert_test_store, order_payload},
};
use serde_json::{json, Value};
use shopify_tools::ShopifyOrder;

use super::{
    helpers::{bearer, send, test_config, test_services},
    mocks::MockStorefront,
};
use crate::{data_objects::JsonResponse, server::configure_routes};

fn shopify_order(id: &str, receive_in_app: bool) -> ShopifyOrder {
    serde_json::from_value(order_payload(id, "jon@example.com", receive_in_app)).unwrap()
}

#[actix_web::test]
async fn operator_routes_need_the_admin_token() {
    let config = test_config();
    let (_db, services) = test_services(&config, Arc::new(MockStorefront::new())).await;
    let app = test::init_service(App::new().configure(|cfg| configure_routes(cfg, &config, &services))).await;

    let req = TestRequest::get().uri("/api/dead_letters?queue=webhooks").to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = TestRequest::get()
        .uri("/api/dead_letters?queue=webhooks")
        .insert_header(("Authorization", "Bearer not-the-token"))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = TestRequest::get().uri("/api/dead_letters?queue=webhooks").insert_header(bearer()).to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body, "[]");
}

#[actix_web::test]
async fn unknown_operator_routes_are_not_found() {
    let config = test_config();
    let (_db, services) = test_services(&config, Arc::new(MockStorefront::new())).await;
    let app = test::init_service(App::new().configure(|cfg| configure_routes(cfg, &config, &services))).await;

    let req = TestRequest::get().uri("/api/nothing_here").insert_header(bearer()).to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let reply: JsonResponse = serde_json::from_str(&body).unwrap();
    assert!(!reply.success);
    assert_eq!(reply.message, "No such route");
}

#[actix_web::test]
async fn dead_letters_are_listed() {
    let config = test_config();
    let (_db, services) = test_services(&config, Arc::new(MockStorefront::new())).await;
    let queue = services.queue.clone();
    let job = TrackingJob {
        store_id: 1,
        order_id: 1,
        fulfillment_id: 1,
        tracking_number: "1Z999AA10123456784".into(),
        tracking_company: Some("UPS".into()),
    };
    let id = queue.enqueue(&job, EnqueueOptions::immediately()).await.unwrap();
    queue.dead_letter(id, "courier said no").await.unwrap();
    let app = test::init_service(App::new().configure(|cfg| configure_routes(cfg, &config, &services))).await;

    let req = TestRequest::get().uri("/api/dead_letters?queue=tracking&limit=10").insert_header(bearer()).to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let jobs: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["id"], id);
    assert_eq!(jobs[0]["last_error"], "courier said no");

    let req = TestRequest::get().uri("/api/dead_letters?queue=webhooks").insert_header(bearer()).to_request();
    let (_, body) = send(&app, req).await;
    assert_eq!(body, "[]");

    let req = TestRequest::get().uri("/api/dead_letters?queue=carrier_pigeons").insert_header(bearer()).to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(queue.dead_letters(QueueName::Tracking, 10).await.unwrap().len(), 1);
}

#[actix_web::test]
async fn manual_sync_pulls_orders_from_the_storefront() {
    let _ = env_logger::try_init();
    let mut storefront = MockStorefront::new();
    storefront
        .expect_fetch_orders()
        .times(1)
        .returning(|_, _, _| Ok(vec![shopify_order("7001", false), shopify_order("7002", false)]));
    storefront.expect_add_order_tag().returning(|_, _, _| Ok(()));
    let config = test_config();
    let (db, services) = test_services(&config, Arc::new(storefront)).await;
    let store = insert_test_store(&db, Default::default()).await;
    let app = test::init_service(App::new().configure(|cfg| configure_routes(cfg, &config, &services))).await;

    let req = TestRequest::post()
        .uri("/api/sync")
        .insert_header(bearer())
        .set_json(json!({ "store_id": store.id }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let summary: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(summary["orders_synced"], 2);
    assert_eq!(summary["failed"], 0);
}

#[actix_web::test]
async fn manual_sync_of_an_unknown_store_is_not_found() {
    let mut storefront = MockStorefront::new();
    storefront.expect_fetch_orders().never();
    let config = test_config();
    let (_db, services) = test_services(&config, Arc::new(storefront)).await;
    let app = test::init_service(App::new().configure(|cfg| configure_routes(cfg, &config, &services))).await;

    let req = TestRequest::post().uri("/api/sync").insert_header(bearer()).set_json(json!({ "store_id": 42 })).to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn tracking_refresh_queues_a_lookup() {
    let config = test_config();
    let (db, services) = test_services(&config, Arc::new(MockStorefront::new())).await;
    let store = insert_test_store(&db, Default::default()).await;
    let mut payload = order_payload("8001", "jon@example.com", false);
    payload["fulfillments"] = json!([fulfillment_payload(55, "8001", "PostNL", "3SABCD1234567")]);
    let order: ShopifyOrder = serde_json::from_value(payload).unwrap();
    let synced = services.sync.sync_order(store.id, &order, None).await.unwrap();
    let fulfillment_id = synced.fulfillments[0].id;
    let queue = services.queue.clone();
    let app = test::init_service(App::new().configure(|cfg| configure_routes(cfg, &config, &services))).await;

    let req = TestRequest::post()
        .uri("/api/tracking/refresh")
        .insert_header(bearer())
        .set_json(json!({ "fulfillment_id": fulfillment_id }))
        .to_request();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let reply: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(reply["fulfillment_id"], fulfillment_id);
    let job_id = reply["job_id"].as_i64().expect("a tracking job");
    let job = queue.fetch_job(job_id).await.unwrap().expect("the job was stored");
    assert_eq!(job.queue, QueueName::Tracking);
    let job: TrackingJob = serde_json::from_str(&job.payload).unwrap();
    assert_eq!(job.tracking_number, "3SABCD1234567");

    let req = TestRequest::post()
        .uri("/api/tracking/refresh")
        .insert_header(bearer())
        .set_json(json!({ "fulfillment_id": 999_999 }))
        .to_request();
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

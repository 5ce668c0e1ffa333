use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use beeylo_sync_engine::{
    couriers::TrackingNormalizer,
    helpers::SHOPIFY_HMAC_HEADER,
    queue::{JobQueue, TrackingJob, WebhookJob},
    rate_limiter::RateLimiter,
    traits::{ShopifyStorefront, StorefrontApi},
    workers::{TrackingJobHandler, WebhookJobHandler, WorkerPool},
    NotificationApi,
    SqliteDatabase,
    SyncApi,
    TrackingApi,
    WebhookProcessor,
};
use log::*;

use crate::{
    background::{start_limiter_eviction, start_notification_sweeper, start_queue_purger, start_shipment_rechecker},
    config::ServerConfig,
    errors::ServerError,
    integrations::shopify::create_shopify_event_handlers,
    middleware::{AdminTokenMiddlewareFactory, HmacMiddlewareFactory},
    routes::{health, not_found, DeadLettersRoute, ManualSyncRoute, RefreshTrackingRoute, ShopifyWebhookRoute},
};

/// Everything the HTTP handlers need, built once and shared by every actix worker.
#[derive(Clone)]
pub struct SyncServices {
    pub sync: SyncApi<SqliteDatabase>,
    pub queue: JobQueue<SqliteDatabase>,
    pub processor: WebhookProcessor<SqliteDatabase>,
    pub tracking: TrackingApi<SqliteDatabase>,
    pub notifications: NotificationApi<SqliteDatabase>,
    pub limiter: RateLimiter,
    pub storefront: Arc<dyn StorefrontApi>,
}

impl SyncServices {
    pub fn new(config: &ServerConfig, db: SqliteDatabase, storefront: Arc<dyn StorefrontApi>) -> Self {
        let limiter = RateLimiter::new(config.rate_limits.clone());
        let handlers = create_shopify_event_handlers(Arc::clone(&storefront), limiter.clone());
        let producers = handlers.producers();
        handlers.start_handlers();
        let queue = JobQueue::new(db.clone(), config.queue.clone());
        let notifications = NotificationApi::new(db.clone(), producers.clone());
        let normalizer = TrackingNormalizer::from_config(&config.couriers, limiter.clone());
        let tracking = TrackingApi::new(db.clone(), normalizer, notifications.clone());
        let sync = SyncApi::new(db);
        let processor = WebhookProcessor::new(sync.clone(), notifications.clone(), queue.clone(), producers);
        Self { sync, queue, processor, tracking, notifications, limiter, storefront }
    }
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(format!("Could not run migrations. {e}")))?;
    let storefront: Arc<dyn StorefrontApi> = Arc::new(ShopifyStorefront::new(&config.shopify.api_version));
    let services = SyncServices::new(&config, db, storefront);

    let webhook_pool = WorkerPool::start::<_, WebhookJob, _>(
        config.workers.webhook_workers,
        services.queue.clone(),
        WebhookJobHandler::new(services.processor.clone()),
        services.limiter.clone(),
    );
    let tracking_pool = WorkerPool::start::<_, TrackingJob, _>(
        config.workers.tracking_workers,
        services.queue.clone(),
        TrackingJobHandler::new(services.tracking.clone()),
        services.limiter.clone(),
    );
    let sweeps = config.sweeps;
    let background = [
        start_notification_sweeper(services.notifications.clone(), sweeps.notification_interval),
        start_shipment_rechecker(services.tracking.clone(), services.queue.clone(), sweeps.shipment_recheck_interval),
        start_queue_purger(services.queue.clone(), sweeps.queue_purge_interval),
        start_limiter_eviction(services.limiter.clone(), sweeps.limiter_eviction_interval),
    ];

    let srv = create_server_instance(config, services)?;
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    info!("💻️ Server stopped. Shutting down the workers.");
    background.iter().for_each(|h| h.abort());
    webhook_pool.shutdown().await;
    tracking_pool.shutdown().await;
    result
}

pub fn create_server_instance(config: ServerConfig, services: SyncServices) -> Result<Server, ServerError> {
    let (host, port) = (config.host.clone(), config.port);
    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("bsync::access_log"))
            .configure(|cfg| configure_routes(cfg, &config, &services))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

/// Registers the shared services and every route. `/webhooks` is behind the signature check and `/api` behind the
/// admin token.
pub fn configure_routes(cfg: &mut web::ServiceConfig, config: &ServerConfig, services: &SyncServices) {
    let webhook_scope = web::scope("/webhooks")
        .wrap(HmacMiddlewareFactory::new(
            SHOPIFY_HMAC_HEADER,
            config.shopify.api_secret.clone(),
            config.shopify.hmac_checks,
        ))
        .service(ShopifyWebhookRoute::<SqliteDatabase, SqliteDatabase>::new());
    let api_scope = web::scope("/api")
        .wrap(AdminTokenMiddlewareFactory::new(config.admin_token.clone()))
        .service(ManualSyncRoute::<SqliteDatabase>::new())
        .service(DeadLettersRoute::<SqliteDatabase>::new())
        .service(RefreshTrackingRoute::<SqliteDatabase>::new())
        .default_service(web::to(not_found));
    cfg.app_data(web::Data::new(services.sync.clone()))
        .app_data(web::Data::new(services.queue.clone()))
        .app_data(web::Data::new(services.processor.clone()))
        .app_data(web::Data::new(services.tracking.clone()))
        .app_data(web::Data::new(services.limiter.clone()))
        .app_data(web::Data::from(Arc::clone(&services.storefront)))
        .service(health)
        .service(webhook_scope)
        .service(api_scope);
}

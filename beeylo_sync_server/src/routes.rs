//! Request handler definitions
//!
//! Define each route and its handler here. Handlers only translate between HTTP and the sync engine: anything longer
//! than a few lines belongs in the engine.
//!
//! The webhook handler has to answer Shopify within a few seconds, so it does no syncing at all. It checks that the
//! store is known, puts the payload on the webhook queue, and returns. The workers do the rest.
use std::str::FromStr;

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use beeylo_sync_engine::{
    queue::{EnqueueOptions, JobQueue, Topic, WebhookJob},
    rate_limiter::RateLimiter,
    traits::{JobBroker, NotificationDatabase, StorefrontApi, SyncDatabase, TrackingDatabase},
    SyncApi,
    TrackingApi,
    WebhookProcessor,
};
use chrono::Utc;
use log::*;
use serde_json::Value;

use crate::{
    data_objects::{
        DeadLetterQuery,
        JsonResponse,
        ManualSyncRequest,
        TrackingRefreshRequest,
        TrackingRefreshResponse,
        WebhookAccepted,
        DEFAULT_DEAD_LETTER_LIMIT,
    },
    errors::ServerError,
};

pub const SHOP_DOMAIN_HEADER: &str = "X-Shopify-Shop-Domain";

// actix-web cannot register generic handlers directly, so the `route!` macro builds a service factory for each one.
//
// `impl A, B` gives the handler one type parameter per bound. `backend A, B` gives it a single type parameter that
// implements all of them.
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal backend $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]<B>(core::marker::PhantomData<fn() -> B>);}
        paste::paste! { impl<B> [<$name:camel Route>]<B> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> B>)
            }
        }}
        paste::paste! { impl<B> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<B>
        where
            B: $($bounds + )+ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<B>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ----------------------------------------------   Webhooks  --------------------------------------------------
route!(shopify_webhook => Post "/{topic}" impl SyncDatabase, JobBroker);
/// Accepts a (signature-checked) Shopify webhook and queues it.
///
/// * Topics the server does not act on are acknowledged with a 200, so Shopify does not retry them.
/// * A shop domain that does not belong to an active store gets a 404.
/// * A failure to queue the job is a 500, and Shopify will deliver the webhook again later.
pub async fn shopify_webhook<BStore, BQueue>(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    api: web::Data<SyncApi<BStore>>,
    queue: web::Data<JobQueue<BQueue>>,
) -> Result<HttpResponse, ServerError>
where
    BStore: SyncDatabase,
    BQueue: JobBroker,
{
    let topic_name = path.into_inner();
    let topic = match Topic::from_str(&topic_name) {
        Ok(t) => t,
        Err(_) => {
            warn!("💻️ Received a webhook for an unsupported topic ({topic_name}). Ignoring it.");
            let ack = WebhookAccepted { success: true, job_id: None, message: format!("Topic {topic_name} ignored") };
            return Ok(HttpResponse::Ok().json(ack));
        },
    };
    let shop_domain = req
        .headers()
        .get(SHOP_DOMAIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ServerError::MissingHeader(SHOP_DOMAIN_HEADER.to_string()))?;
    let store = api.db().fetch_store_by_domain(&shop_domain).await?.ok_or_else(|| {
        warn!("💻️ Received a {topic} webhook from {shop_domain}, which is not an active store.");
        ServerError::NoRecordFound(format!("Store {shop_domain}"))
    })?;
    let payload = serde_json::from_slice::<Value>(&body).map_err(|e| {
        warn!("💻️ The {topic} webhook from {shop_domain} is not valid JSON. {e}");
        ServerError::InvalidRequestBody(e.to_string())
    })?;
    let job = WebhookJob { store_id: store.id, shop_domain, topic, payload, received_at: Utc::now() };
    let job_id = queue.enqueue(&job, EnqueueOptions::default()).await.map_err(|e| {
        error!("💻️ Could not queue the {topic} webhook from {}. {e}", job.shop_domain);
        ServerError::from(e)
    })?;
    info!("💻️ {topic} webhook from {} queued as job {job_id}", job.shop_domain);
    let ack = WebhookAccepted { success: true, job_id: Some(job_id), message: format!("{topic} queued") };
    Ok(HttpResponse::Ok().json(ack))
}

// ----------------------------------------------   Operator API  ----------------------------------------------
route!(manual_sync => Post "/sync" backend SyncDatabase, NotificationDatabase, JobBroker);
pub async fn manual_sync<B>(
    body: web::Json<ManualSyncRequest>,
    processor: web::Data<WebhookProcessor<B>>,
    storefront: web::Data<dyn StorefrontApi>,
    limiter: web::Data<RateLimiter>,
) -> Result<HttpResponse, ServerError>
where
    B: SyncDatabase + NotificationDatabase + JobBroker,
{
    let ManualSyncRequest { store_id, since } = body.into_inner();
    debug!("💻️ Manual sync requested for store #{store_id} (since {since:?})");
    let summary = processor.manual_sync(storefront.get_ref(), limiter.get_ref(), store_id, since).await?;
    Ok(HttpResponse::Ok().json(summary))
}

route!(dead_letters => Get "/dead_letters" impl JobBroker);
pub async fn dead_letters<B: JobBroker>(
    query: web::Query<DeadLetterQuery>,
    queue: web::Data<JobQueue<B>>,
) -> Result<HttpResponse, ServerError> {
    let DeadLetterQuery { queue: name, limit } = query.into_inner();
    let limit = limit.unwrap_or(DEFAULT_DEAD_LETTER_LIMIT);
    debug!("💻️ Fetching up to {limit} dead letters from {name}");
    let jobs = queue.dead_letters(name, limit).await?;
    Ok(HttpResponse::Ok().json(jobs))
}

route!(
    refresh_tracking => Post "/tracking/refresh" backend SyncDatabase, TrackingDatabase, NotificationDatabase, JobBroker
);
pub async fn refresh_tracking<B>(
    body: web::Json<TrackingRefreshRequest>,
    api: web::Data<TrackingApi<B>>,
    queue: web::Data<JobQueue<B>>,
) -> Result<HttpResponse, ServerError>
where
    B: SyncDatabase + TrackingDatabase + NotificationDatabase + JobBroker,
{
    let fulfillment_id = body.fulfillment_id;
    let job_id = api.refresh_fulfillment(queue.get_ref(), fulfillment_id).await?;
    match job_id {
        Some(id) => info!("💻️ Tracking refresh for fulfillment #{fulfillment_id} queued as job {id}"),
        None => info!("💻️ Fulfillment #{fulfillment_id} cannot be tracked. Nothing was queued."),
    }
    Ok(HttpResponse::Ok().json(TrackingRefreshResponse { fulfillment_id, job_id }))
}

/// Fallback for `/api` paths that don't exist.
pub async fn not_found() -> HttpResponse {
    HttpResponse::NotFound().json(JsonResponse::failure("No such route"))
}

//! Server configuration, read from `BSYNC_*` environment variables.
//!
//! Every setting falls back to a default, with a log line saying so. The only settings without a useful default are
//! the database URL and the Shopify API secret; without the secret every signed webhook is rejected.
use std::{env, fmt::Display, str::FromStr, time::Duration};

use beeylo_common::{parse_boolean_flag, Secret};
use beeylo_sync_engine::{
    couriers::{
        ApiKeyConfig,
        BasicAuthConfig,
        CourierConfig,
        OAuthClientConfig,
        DEFAULT_DHL_URL,
        DEFAULT_DPD_URL,
        DEFAULT_FEDEX_URL,
        DEFAULT_GLS_URL,
        DEFAULT_POSTNL_URL,
        DEFAULT_UPS_URL,
    },
    queue::QueueConfig,
    rate_limiter::RateLimiterConfig,
};
use log::*;
use shopify_tools::ShopifyConfig as ShopifyApiConfig;

const DEFAULT_BSYNC_HOST: &str = "127.0.0.1";
const DEFAULT_BSYNC_PORT: u16 = 8370;
const DEFAULT_WEBHOOK_WORKERS: usize = 10;
const DEFAULT_TRACKING_WORKERS: usize = 5;
const DEFAULT_NOTIFICATION_SWEEP: Duration = Duration::from_secs(60);
const DEFAULT_SHIPMENT_RECHECK: Duration = Duration::from_secs(30 * 60);
const DEFAULT_LIMITER_EVICTION: Duration = Duration::from_secs(5 * 60);
const DEFAULT_QUEUE_PURGE: Duration = Duration::from_secs(10 * 60);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub shopify: ShopifyConfig,
    /// When set, every `/api` request must carry `Authorization: Bearer <token>`.
    pub admin_token: Option<Secret<String>>,
    pub workers: WorkerConfig,
    pub queue: QueueConfig,
    pub rate_limits: RateLimiterConfig,
    pub couriers: CourierConfig,
    pub sweeps: SweepConfig,
}

#[derive(Clone, Debug)]
pub struct ShopifyConfig {
    /// The app's API secret. Shopify signs webhooks with it.
    pub api_secret: Secret<String>,
    pub api_version: String,
    /// If false, webhook signatures are not checked at all. Only ever turn this off in development.
    pub hmac_checks: bool,
}

impl Default for ShopifyConfig {
    fn default() -> Self {
        Self { api_secret: Secret::default(), api_version: "2024-04".to_string(), hmac_checks: true }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct WorkerConfig {
    pub webhook_workers: usize,
    pub tracking_workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { webhook_workers: DEFAULT_WEBHOOK_WORKERS, tracking_workers: DEFAULT_TRACKING_WORKERS }
    }
}

/// How often each background task runs.
#[derive(Clone, Copy, Debug)]
pub struct SweepConfig {
    pub notification_interval: Duration,
    pub shipment_recheck_interval: Duration,
    pub limiter_eviction_interval: Duration,
    pub queue_purge_interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            notification_interval: DEFAULT_NOTIFICATION_SWEEP,
            shipment_recheck_interval: DEFAULT_SHIPMENT_RECHECK,
            limiter_eviction_interval: DEFAULT_LIMITER_EVICTION,
            queue_purge_interval: DEFAULT_QUEUE_PURGE,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BSYNC_HOST.to_string(),
            port: DEFAULT_BSYNC_PORT,
            database_url: String::default(),
            shopify: ShopifyConfig::default(),
            admin_token: None,
            workers: WorkerConfig::default(),
            queue: QueueConfig::default(),
            rate_limits: RateLimiterConfig::default(),
            couriers: CourierConfig::default(),
            sweeps: SweepConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("BSYNC_HOST").ok().unwrap_or_else(|| DEFAULT_BSYNC_HOST.into());
        let port = parse_or_default("BSYNC_PORT", DEFAULT_BSYNC_PORT);
        let database_url = env::var("BSYNC_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ BSYNC_DATABASE_URL is not set. Please set it to the URL for the sync database.");
            String::default()
        });
        let admin_token = env::var("BSYNC_ADMIN_TOKEN").ok().filter(|s| !s.trim().is_empty()).map(Secret::new);
        if admin_token.is_none() {
            warn!("🪛️ BSYNC_ADMIN_TOKEN is not set. The /api routes are open to anyone who can reach the server.");
        }
        Self {
            host,
            port,
            database_url,
            shopify: ShopifyConfig::from_env_or_default(),
            admin_token,
            workers: WorkerConfig::from_env_or_default(),
            queue: queue_config_from_env(),
            rate_limits: rate_limits_from_env(),
            couriers: courier_config_from_env(),
            sweeps: SweepConfig::from_env_or_default(),
        }
    }
}

impl ShopifyConfig {
    pub fn from_env_or_default() -> Self {
        let api_secret = env::var("BSYNC_SHOPIFY_API_SECRET").ok().unwrap_or_else(|| {
            error!(
                "🪛️ BSYNC_SHOPIFY_API_SECRET is not set. Please set it to the API secret of your Shopify app, or no \
                 webhook will be accepted."
            );
            String::default()
        });
        let hmac_checks = parse_boolean_flag(env::var("BSYNC_SHOPIFY_HMAC_CHECKS").ok(), true);
        if !hmac_checks {
            warn!("🚨️ Webhook signature checks are DISABLED. Anyone can post webhooks to this server.");
        }
        let api_version = ShopifyApiConfig::api_version_from_env_or_default();
        Self { api_secret: Secret::new(api_secret), api_version, hmac_checks }
    }
}

impl WorkerConfig {
    pub fn from_env_or_default() -> Self {
        let webhook_workers = parse_or_default("BSYNC_WEBHOOK_WORKERS", DEFAULT_WEBHOOK_WORKERS).max(1);
        let tracking_workers = parse_or_default("BSYNC_TRACKING_WORKERS", DEFAULT_TRACKING_WORKERS).max(1);
        Self { webhook_workers, tracking_workers }
    }
}

impl SweepConfig {
    pub fn from_env_or_default() -> Self {
        Self {
            notification_interval: secs_or_default("BSYNC_NOTIFICATION_SWEEP_SECS", DEFAULT_NOTIFICATION_SWEEP),
            shipment_recheck_interval: secs_or_default("BSYNC_SHIPMENT_RECHECK_SECS", DEFAULT_SHIPMENT_RECHECK),
            limiter_eviction_interval: secs_or_default("BSYNC_LIMITER_EVICTION_SECS", DEFAULT_LIMITER_EVICTION),
            queue_purge_interval: secs_or_default("BSYNC_QUEUE_PURGE_SECS", DEFAULT_QUEUE_PURGE),
        }
    }
}

fn queue_config_from_env() -> QueueConfig {
    let mut config = QueueConfig::default();
    for (prefix, policy) in [("WEBHOOK", &mut config.webhooks), ("TRACKING", &mut config.tracking)] {
        policy.max_attempts = parse_or_default(&format!("BSYNC_{prefix}_MAX_ATTEMPTS"), policy.max_attempts).max(1);
        policy.backoff_base = secs_or_default(&format!("BSYNC_{prefix}_BACKOFF_SECS"), policy.backoff_base);
    }
    config.tracking.initial_delay = secs_or_default("BSYNC_TRACKING_GRACE_PERIOD_SECS", config.tracking.initial_delay);
    config.completed_retention = secs_or_default("BSYNC_COMPLETED_RETENTION_SECS", config.completed_retention);
    config.dead_letter_retention = secs_or_default("BSYNC_DEAD_LETTER_RETENTION_SECS", config.dead_letter_retention);
    config
}

fn rate_limits_from_env() -> RateLimiterConfig {
    let mut config = RateLimiterConfig::default();
    config.webhook_ingress_per_sec =
        parse_or_default("BSYNC_WEBHOOK_JOBS_PER_SEC", config.webhook_ingress_per_sec).max(1);
    config.tracking_ingress_per_sec =
        parse_or_default("BSYNC_TRACKING_JOBS_PER_SEC", config.tracking_ingress_per_sec).max(1);
    config
}

fn courier_config_from_env() -> CourierConfig {
    let config = CourierConfig {
        postnl: ApiKeyConfig::new(
            &secret_var("BSYNC_POSTNL_API_KEY"),
            &url_var("BSYNC_POSTNL_URL", DEFAULT_POSTNL_URL),
        ),
        dhl: ApiKeyConfig::new(&secret_var("BSYNC_DHL_API_KEY"), &url_var("BSYNC_DHL_URL", DEFAULT_DHL_URL)),
        dpd: ApiKeyConfig::new(&secret_var("BSYNC_DPD_API_KEY"), &url_var("BSYNC_DPD_URL", DEFAULT_DPD_URL)),
        ups: OAuthClientConfig::new(
            &secret_var("BSYNC_UPS_CLIENT_ID"),
            &secret_var("BSYNC_UPS_CLIENT_SECRET"),
            &url_var("BSYNC_UPS_URL", DEFAULT_UPS_URL),
        ),
        fedex: OAuthClientConfig::new(
            &secret_var("BSYNC_FEDEX_CLIENT_ID"),
            &secret_var("BSYNC_FEDEX_CLIENT_SECRET"),
            &url_var("BSYNC_FEDEX_URL", DEFAULT_FEDEX_URL),
        ),
        gls: BasicAuthConfig::new(
            &secret_var("BSYNC_GLS_USERNAME"),
            &secret_var("BSYNC_GLS_PASSWORD"),
            &url_var("BSYNC_GLS_URL", DEFAULT_GLS_URL),
        ),
    };
    let enabled = [
        ("PostNL", config.postnl.is_enabled()),
        ("DHL", config.dhl.is_enabled()),
        ("DPD", config.dpd.is_enabled()),
        ("UPS", config.ups.is_enabled()),
        ("FedEx", config.fedex.is_enabled()),
        ("GLS", config.gls.is_enabled()),
    ];
    for (name, on) in enabled {
        if on {
            info!("🪛️ {name} tracking is enabled");
        } else {
            warn!("🪛️ {name} credentials are not set. Shipments sent with {name} will not be tracked.");
        }
    }
    config
}

// Credentials are never logged, set or not.
fn secret_var(name: &str) -> String {
    env::var(name).unwrap_or_default()
}

fn url_var(name: &str, default: &str) -> String {
    env::var(name).ok().filter(|s| !s.trim().is_empty()).unwrap_or_else(|| default.to_string())
}

fn parse_or_default<T>(name: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
    T::Err: Display,
{
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => {
            debug!("🪛️ {name} is not set. Using the default, {default}.");
            default
        },
    }
}

fn secs_or_default(name: &str, default: Duration) -> Duration {
    Duration::from_secs(parse_or_default(name, default.as_secs()))
}

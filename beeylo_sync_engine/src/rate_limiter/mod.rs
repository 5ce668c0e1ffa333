//! Keyed rate limiting for calls to storefronts, couriers and the job queues.
//!
//! Every key gets its own [`TokenBucket`] and a concurrency gate. Calls that share a key are paced by the bucket and
//! run at most `max_concurrent` at a time; calls on different keys never wait on each other. Keys are created on first
//! use and evicted once they have been idle for a while. A key that is still in use is never evicted.
mod token_bucket;

use std::{
    collections::HashMap,
    fmt::Display,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use dashmap::DashMap;
use log::*;
use thiserror::Error;
use tokio::{
    sync::{Mutex, OwnedSemaphorePermit, Semaphore},
    time::{sleep, Instant},
};
pub use token_bucket::TokenBucket;

use crate::{couriers::Courier, db_types::QueueName};

pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Error)]
pub enum RateLimiterError {
    #[error("The rate limiter for {0} has been shut down")]
    Closed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimiterKey {
    /// Admin API calls for one tenant's storefront.
    Store(i64),
    Courier(Courier),
    /// The ingress ceiling for a job queue.
    Queue(QueueName),
}

impl Display for LimiterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(id) => write!(f, "store:{id}"),
            Self::Courier(c) => write!(f, "courier:{c}"),
            Self::Queue(q) => write!(f, "queue:{q}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub capacity: u32,
    pub refill_per_sec: f64,
    pub min_interval: Duration,
    pub max_concurrent: usize,
}

impl RateLimit {
    /// `rate` calls per second with a burst of the same size, one call in flight at a time, and calls spaced evenly.
    pub fn per_second(rate: u32) -> Self {
        let rate = rate.max(1);
        Self {
            capacity: rate,
            refill_per_sec: f64::from(rate),
            min_interval: Duration::from_secs(1) / rate,
            max_concurrent: 1,
        }
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Per-tenant storefront API limit.
    pub store: RateLimit,
    pub couriers: HashMap<Courier, RateLimit>,
    /// Applies to any courier without a limit of its own.
    pub fallback: RateLimit,
    pub webhook_ingress_per_sec: u32,
    pub tracking_ingress_per_sec: u32,
    pub idle_ttl: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        let couriers = HashMap::from([
            (Courier::PostNl, RateLimit::per_second(10)),
            (Courier::Dhl, RateLimit::per_second(5)),
            (Courier::Ups, RateLimit::per_second(4)),
            (Courier::FedEx, RateLimit::per_second(4)),
            (Courier::Dpd, RateLimit::per_second(2)),
            (Courier::Gls, RateLimit::per_second(2)),
        ]);
        Self {
            store: RateLimit::per_second(40).with_min_interval(Duration::from_millis(500)),
            couriers,
            fallback: RateLimit::per_second(5),
            webhook_ingress_per_sec: 100,
            tracking_ingress_per_sec: 20,
            idle_ttl: DEFAULT_IDLE_TTL,
        }
    }
}

impl RateLimiterConfig {
    pub fn limit_for(&self, key: &LimiterKey) -> RateLimit {
        match key {
            LimiterKey::Store(_) => self.store,
            LimiterKey::Courier(c) => self.couriers.get(c).copied().unwrap_or(self.fallback),
            LimiterKey::Queue(q) => {
                let rate = match q {
                    QueueName::Webhooks => self.webhook_ingress_per_sec,
                    QueueName::Tracking => self.tracking_ingress_per_sec,
                };
                RateLimit::per_second(rate).with_min_interval(Duration::ZERO)
            },
        }
    }
}

struct KeyedLimiter {
    permits: Arc<Semaphore>,
    bucket: Mutex<TokenBucket>,
    /// Milliseconds since the registry's epoch at which this key was last used.
    last_used: AtomicU64,
}

impl KeyedLimiter {
    fn new(limit: RateLimit, now_ms: u64) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit.max_concurrent.max(1))),
            bucket: Mutex::new(TokenBucket::new(limit.capacity, limit.refill_per_sec, limit.min_interval)),
            last_used: AtomicU64::new(now_ms),
        }
    }
}

/// Held while a rate-limited call is in flight. Dropping it lets the next caller with the same key proceed.
pub struct RatePermit {
    _permit: OwnedSemaphorePermit,
    _limiter: Arc<KeyedLimiter>,
}

#[derive(Clone)]
pub struct RateLimiter {
    config: Arc<RateLimiterConfig>,
    limiters: Arc<DashMap<LimiterKey, Arc<KeyedLimiter>>>,
    epoch: Instant,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimiterConfig::default())
    }
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        Self { config: Arc::new(config), limiters: Arc::new(DashMap::new()), epoch: Instant::now() }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    fn now_ms(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn limiter_for(&self, key: LimiterKey) -> Arc<KeyedLimiter> {
        let now_ms = self.now_ms();
        let limiter = self
            .limiters
            .entry(key)
            .or_insert_with(|| {
                trace!("🚦️ Creating rate limiter for {key}");
                Arc::new(KeyedLimiter::new(self.config.limit_for(&key), now_ms))
            })
            .clone();
        limiter.last_used.store(now_ms, Ordering::Relaxed);
        limiter
    }

    /// Waits until a call with this key may proceed. The call is considered in flight until the permit is dropped.
    pub async fn acquire(&self, key: LimiterKey) -> Result<RatePermit, RateLimiterError> {
        let limiter = self.limiter_for(key);
        let permit =
            limiter.permits.clone().acquire_owned().await.map_err(|_| RateLimiterError::Closed(key.to_string()))?;
        loop {
            let result = limiter.bucket.lock().await.try_take(Instant::now());
            match result {
                Ok(()) => break,
                Err(wait) => {
                    trace!("🚦️ {key} is throttled for {}ms", wait.as_millis());
                    sleep(wait).await;
                },
            }
        }
        limiter.last_used.store(self.now_ms(), Ordering::Relaxed);
        Ok(RatePermit { _permit: permit, _limiter: limiter })
    }

    /// Runs `fut` once a permit for the key has been acquired, holding the permit until it completes.
    pub async fn schedule<F, T>(&self, key: LimiterKey, fut: F) -> Result<T, RateLimiterError>
    where F: Future<Output = T> {
        let _permit = self.acquire(key).await?;
        Ok(fut.await)
    }

    /// Drops limiters for keys that have not been used for the configured idle period. Keys with a call in flight are
    /// kept regardless. Returns the number of keys evicted.
    pub fn evict_idle(&self) -> usize {
        let now_ms = self.now_ms();
        let ttl_ms = u64::try_from(self.config.idle_ttl.as_millis()).unwrap_or(u64::MAX);
        let before = self.limiters.len();
        self.limiters.retain(|_, limiter| {
            let idle_ms = now_ms.saturating_sub(limiter.last_used.load(Ordering::Relaxed));
            Arc::strong_count(limiter) > 1 || idle_ms < ttl_ms
        });
        let evicted = before.saturating_sub(self.limiters.len());
        if evicted > 0 {
            debug!("🚦️ Evicted {evicted} idle rate limiters");
        }
        evicted
    }

    pub fn active_keys(&self) -> usize {
        self.limiters.len()
    }
}

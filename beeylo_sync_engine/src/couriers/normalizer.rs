use std::{collections::HashMap, sync::Arc, time::Duration};

use log::*;
use tokio::time::sleep;

use super::{
    Courier,
    CourierClient,
    CourierConfig,
    CourierError,
    CourierTrackingResponse,
    DhlClient,
    DpdClient,
    FedExClient,
    GlsClient,
    PostNlClient,
    UpsClient,
};
use crate::rate_limiter::{LimiterKey, RateLimiter};

/// How many times a vendor 429 is retried before the call is reported as an upstream failure.
pub const RATE_LIMIT_RETRIES: u32 = 3;
const RATE_LIMIT_WAIT: Duration = Duration::from_secs(1);

/// Routes tracking lookups to the adapter for a carrier, pacing every call through the courier's rate limiter key.
#[derive(Clone)]
pub struct TrackingNormalizer {
    clients: HashMap<Courier, Arc<dyn CourierClient>>,
    limiter: RateLimiter,
}

impl TrackingNormalizer {
    pub fn new(limiter: RateLimiter) -> Self {
        Self { clients: HashMap::new(), limiter }
    }

    /// Registers an adapter for every courier that has credentials. The rest are left out, so their shipments are
    /// skipped.
    pub fn from_config(config: &CourierConfig, limiter: RateLimiter) -> Self {
        let mut normalizer = Self::new(limiter);
        let clients: [(Courier, Result<Arc<dyn CourierClient>, CourierError>); 6] = [
            (Courier::PostNl, PostNlClient::new(config.postnl.clone()).map(|c| Arc::new(c) as Arc<dyn CourierClient>)),
            (Courier::Dhl, DhlClient::new(config.dhl.clone()).map(|c| Arc::new(c) as Arc<dyn CourierClient>)),
            (Courier::Dpd, DpdClient::new(config.dpd.clone()).map(|c| Arc::new(c) as Arc<dyn CourierClient>)),
            (Courier::Ups, UpsClient::new(config.ups.clone()).map(|c| Arc::new(c) as Arc<dyn CourierClient>)),
            (Courier::FedEx, FedExClient::new(config.fedex.clone()).map(|c| Arc::new(c) as Arc<dyn CourierClient>)),
            (Courier::Gls, GlsClient::new(config.gls.clone()).map(|c| Arc::new(c) as Arc<dyn CourierClient>)),
        ];
        for (courier, client) in clients {
            match client {
                Ok(client) => {
                    info!("🚚️ {courier} tracking is enabled");
                    normalizer.clients.insert(courier, client);
                },
                Err(e) => info!("🚚️ {courier} tracking is disabled. {e}"),
            }
        }
        normalizer
    }

    /// Adds or replaces the adapter for the client's courier.
    pub fn with_client(mut self, client: Arc<dyn CourierClient>) -> Self {
        self.clients.insert(client.courier(), client);
        self
    }

    pub fn resolve(&self, carrier: &str) -> Option<Courier> {
        Courier::resolve(carrier)
    }

    /// True when the carrier resolves to a courier that has an adapter registered.
    pub fn is_supported(&self, carrier: &str) -> bool {
        self.resolve(carrier).map(|c| self.clients.contains_key(&c)).unwrap_or(false)
    }

    pub fn enabled_couriers(&self) -> Vec<Courier> {
        Courier::ALL.into_iter().filter(|c| self.clients.contains_key(c)).collect()
    }

    /// Fetches and normalizes tracking for a shipment.
    ///
    /// Returns `Ok(None)` when the carrier is not one we support, or its adapter is not configured. Those shipments
    /// fall back to the storefront's own tracking status.
    ///
    /// Courier rate limit responses are absorbed here: the call waits and tries again a few times, and is reported as
    /// an [`CourierError::Upstream`] failure if the courier keeps refusing.
    pub async fn fetch_tracking(
        &self,
        carrier: &str,
        tracking_number: &str,
    ) -> Result<Option<CourierTrackingResponse>, CourierError> {
        let Some(courier) = self.resolve(carrier) else {
            debug!("🚚️ Carrier '{carrier}' is not supported. Skipping tracking for {tracking_number}");
            return Ok(None);
        };
        let Some(client) = self.clients.get(&courier) else {
            debug!("🚚️ {courier} tracking is not configured. Skipping tracking for {tracking_number}");
            return Ok(None);
        };
        let key = LimiterKey::Courier(courier);
        let mut attempt = 0;
        loop {
            let result = self
                .limiter
                .schedule(key, client.fetch_tracking(tracking_number))
                .await
                .map_err(|e| CourierError::Upstream(e.to_string()))?;
            match result {
                Err(CourierError::RateLimited(e)) if attempt < RATE_LIMIT_RETRIES => {
                    attempt += 1;
                    let wait = RATE_LIMIT_WAIT * 2u32.pow(attempt - 1);
                    warn!("🚦️ {courier} is throttling us. Waiting {}ms before trying again. {e}", wait.as_millis());
                    sleep(wait).await;
                },
                Err(CourierError::RateLimited(e)) => {
                    warn!("🚦️ {courier} is still throttling after {attempt} retries. Giving up for now.");
                    return Err(CourierError::Upstream(e));
                },
                Ok(response) => {
                    debug!(
                        "🚚️ {courier} reports {} for {tracking_number} with {} events",
                        response.status,
                        response.events.len()
                    );
                    return Ok(Some(response));
                },
                Err(e) => return Err(e),
            }
        }
    }
}

use std::{future::Future, time::Duration};

use beeylo_common::Secret;
use log::*;
use serde::Deserialize;
use tokio::{sync::Mutex, time::Instant};

use super::CourierError;

/// Tokens are refreshed this long before the courier says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

#[derive(Debug)]
struct CachedToken {
    token: Secret<String>,
    expires_at: Option<Instant>,
}

/// Caches an OAuth2 client-credentials token until it expires, or until a request is rejected with it.
#[derive(Debug, Default)]
pub struct OAuthTokenCache {
    token: Mutex<Option<CachedToken>>,
}

impl OAuthTokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached token, calling `fetch` for a new one if there is none or it has expired. Concurrent callers
    /// wait for the same fetch.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<Secret<String>, CourierError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TokenResponse, CourierError>>,
    {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            let fresh = cached.expires_at.map(|t| Instant::now() < t).unwrap_or(true);
            if fresh {
                return Ok(cached.token.clone());
            }
            debug!("🚚️ OAuth token expired. Fetching a new one.");
        }
        let response = fetch().await?;
        let expires_at = response
            .expires_in
            .map(|secs| Instant::now() + Duration::from_secs(secs).saturating_sub(EXPIRY_MARGIN));
        let token = Secret::new(response.access_token);
        *guard = Some(CachedToken { token: token.clone(), expires_at });
        Ok(token)
    }

    pub async fn invalidate(&self) {
        *self.token.lock().await = None;
    }
}

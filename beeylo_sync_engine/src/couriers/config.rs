use beeylo_common::Secret;

pub const DEFAULT_POSTNL_URL: &str = "https://api.postnl.nl/shipment/v2";
pub const DEFAULT_DHL_URL: &str = "https://api-eu.dhl.com/track/shipments";
pub const DEFAULT_DPD_URL: &str = "https://api.dpd.com/shipping/v1";
pub const DEFAULT_UPS_URL: &str = "https://onlinetools.ups.com";
pub const DEFAULT_FEDEX_URL: &str = "https://apis.fedex.com";
pub const DEFAULT_GLS_URL: &str = "https://api.mygls.hu";

#[derive(Debug, Clone, Default)]
pub struct ApiKeyConfig {
    pub api_key: Secret<String>,
    pub base_url: String,
}

impl ApiKeyConfig {
    pub fn new(api_key: &str, base_url: &str) -> Self {
        Self { api_key: Secret::from(api_key), base_url: base_url.trim_end_matches('/').to_string() }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_set()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub base_url: String,
}

impl OAuthClientConfig {
    pub fn new(client_id: &str, client_secret: &str, base_url: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: Secret::from(client_secret),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.client_id.trim().is_empty() && self.client_secret.is_set()
    }
}

#[derive(Debug, Clone, Default)]
pub struct BasicAuthConfig {
    pub username: String,
    pub password: Secret<String>,
    pub base_url: String,
}

impl BasicAuthConfig {
    pub fn new(username: &str, password: &str, base_url: &str) -> Self {
        Self {
            username: username.to_string(),
            password: Secret::from(password),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.username.trim().is_empty() && self.password.is_set()
    }
}

/// Credentials and endpoints for every courier. An adapter is only enabled once its credentials are set.
#[derive(Debug, Clone)]
pub struct CourierConfig {
    pub postnl: ApiKeyConfig,
    pub dhl: ApiKeyConfig,
    pub dpd: ApiKeyConfig,
    pub ups: OAuthClientConfig,
    pub fedex: OAuthClientConfig,
    pub gls: BasicAuthConfig,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            postnl: ApiKeyConfig::new("", DEFAULT_POSTNL_URL),
            dhl: ApiKeyConfig::new("", DEFAULT_DHL_URL),
            dpd: ApiKeyConfig::new("", DEFAULT_DPD_URL),
            ups: OAuthClientConfig::new("", "", DEFAULT_UPS_URL),
            fedex: OAuthClientConfig::new("", "", DEFAULT_FEDEX_URL),
            gls: BasicAuthConfig::new("", "", DEFAULT_GLS_URL),
        }
    }
}

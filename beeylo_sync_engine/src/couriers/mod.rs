//! Courier tracking adapters and the normalizer that routes shipments to them.
//!
//! Every adapter speaks its vendor's REST contract and translates the response into a [`CourierTrackingResponse`].
//! Vendor status codes are mapped onto [`ShipmentStatus`]; codes that are not in an adapter's table map to
//! [`ShipmentStatus::Unknown`], never to an error.
mod config;
mod dhl;
mod dpd;
mod fedex;
mod gls;
mod normalizer;
mod oauth;
mod postnl;
mod ups;

use std::{fmt::Display, str::FromStr, sync::OnceLock, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
pub use config::{
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
};
pub use dhl::DhlClient;
pub use dpd::DpdClient;
pub use fedex::FedExClient;
pub use gls::GlsClient;
use log::*;
pub use normalizer::TrackingNormalizer;
pub use oauth::OAuthTokenCache;
pub use postnl::PostNlClient;
use regex::Regex;
use reqwest::{Client, Response};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use shopify_tools::helpers::value_as_string;
use thiserror::Error;
pub use ups::UpsClient;

use crate::db_types::{ConversionError, ShipmentStatus};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Courier {
    PostNl,
    Dhl,
    Dpd,
    Ups,
    FedEx,
    Gls,
}

const ALIASES: [(Courier, &[&str]); 6] = [
    (Courier::PostNl, &["postnl", "post nl"]),
    (Courier::Dhl, &["dhl"]),
    (Courier::Dpd, &["dpd"]),
    (Courier::Ups, &["ups", "united parcel"]),
    (Courier::FedEx, &["fedex", "federal express"]),
    (Courier::Gls, &["gls", "general logistics"]),
];

fn punctuation() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").ok()).as_ref()
}

impl Courier {
    pub const ALL: [Courier; 6] = [Self::PostNl, Self::Dhl, Self::Dpd, Self::Ups, Self::FedEx, Self::Gls];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PostNl => "postnl",
            Self::Dhl => "dhl",
            Self::Dpd => "dpd",
            Self::Ups => "ups",
            Self::FedEx => "fedex",
            Self::Gls => "gls",
        }
    }

    /// Resolves a free-text carrier name, as entered by a merchant, to a supported courier.
    ///
    /// Matching is case-insensitive and looks for any known alias within the name, so "DHL Express" and
    /// "PostNL - Pakket" both resolve. Punctuation is treated as whitespace.
    pub fn resolve(carrier: &str) -> Option<Self> {
        let lowered = carrier.to_lowercase();
        let normalized = match punctuation() {
            Some(re) => re.replace_all(&lowered, " ").into_owned(),
            None => lowered,
        };
        let normalized = normalized.trim();
        if normalized.is_empty() {
            return None;
        }
        ALIASES
            .iter()
            .find(|(_, aliases)| aliases.iter().any(|alias| normalized.contains(alias)))
            .map(|(courier, _)| *courier)
    }
}

impl Display for Courier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Courier {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::resolve(s).ok_or_else(|| ConversionError::new("courier", s))
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CourierError {
    #[error("Courier rejected our credentials: {0}")]
    Auth(String),
    #[error("Tracking number not found: {0}")]
    NotFound(String),
    #[error("Courier rate limit exceeded: {0}")]
    RateLimited(String),
    #[error("Courier request failed: {0}")]
    Upstream(String),
    #[error("Courier adapter is not configured: {0}")]
    NotConfigured(String),
    #[error("Courier returned an unexpected response: {0}")]
    InvalidResponse(String),
}

impl CourierError {
    pub fn from_status(courier: Courier, status: u16, body: &str) -> Self {
        let detail = format!("{courier} responded with {status}. {}", body.chars().take(200).collect::<String>());
        match status {
            401 | 403 => Self::Auth(detail),
            404 => Self::NotFound(detail),
            429 => Self::RateLimited(detail),
            _ => Self::Upstream(detail),
        }
    }
}

/// One scan or status change reported by a courier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierEvent {
    pub timestamp: DateTime<Utc>,
    pub status: ShipmentStatus,
    pub description: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfDelivery {
    pub signature_url: Option<String>,
    pub photo_url: Option<String>,
    pub receiver_name: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A courier's view of a shipment, in canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourierTrackingResponse {
    pub courier: Courier,
    pub tracking_number: String,
    pub status: ShipmentStatus,
    pub status_description: String,
    pub current_location: Option<String>,
    /// Oldest first. Events sharing a timestamp keep the order the courier reported them in.
    pub events: Vec<CourierEvent>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
    /// Only present when the courier reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proof_of_delivery: Option<ProofOfDelivery>,
}

impl CourierTrackingResponse {
    pub fn new(courier: Courier, tracking_number: &str, status: ShipmentStatus) -> Self {
        Self {
            courier,
            tracking_number: tracking_number.to_string(),
            status,
            status_description: String::new(),
            current_location: None,
            events: Vec::new(),
            estimated_delivery: None,
            actual_delivery: None,
            proof_of_delivery: None,
        }
    }

    /// Sorts the events, and falls back to the latest event's location when the courier gave no current location.
    pub fn finalize(mut self) -> Self {
        self.events.sort_by_key(|e| e.timestamp);
        if self.current_location.as_deref().map(str::trim).unwrap_or_default().is_empty() {
            self.current_location = self.events.iter().rev().find_map(|e| e.location.clone());
        }
        self
    }

    pub fn is_delivered(&self) -> bool {
        self.status == ShipmentStatus::Delivered || self.actual_delivery.is_some()
    }
}

/// A tracking adapter for one courier.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CourierClient: Send + Sync {
    fn courier(&self) -> Courier;

    async fn fetch_tracking(&self, tracking_number: &str) -> Result<CourierTrackingResponse, CourierError>;
}

pub(crate) fn http_client() -> Result<Client, CourierError> {
    Client::builder().timeout(REQUEST_TIMEOUT).build().map_err(|e| CourierError::NotConfigured(e.to_string()))
}

pub(crate) fn request_failed(courier: Courier, e: reqwest::Error) -> CourierError {
    CourierError::Upstream(format!("{courier} request failed. {e}"))
}

/// Reads a JSON body from a successful response, or classifies the failure by its status code.
pub(crate) async fn read_json(courier: Courier, response: Response) -> Result<Value, CourierError> {
    let status = response.status();
    trace!("🚚️ {courier} responded with {status}");
    if status.is_success() {
        response.json::<Value>().await.map_err(|e| CourierError::InvalidResponse(format!("{courier}: {e}")))
    } else {
        let body = response.text().await.unwrap_or_default();
        Err(CourierError::from_status(courier, status.as_u16(), &body))
    }
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(courier: Courier, body: Value) -> Result<T, CourierError> {
    serde_json::from_value(body).map_err(|e| CourierError::InvalidResponse(format!("{courier}: {e}")))
}

/// Deserializes a scalar (string or number) as a string. Status codes arrive as either, depending on the vendor.
pub(crate) fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let s = Option::<Value>::deserialize(deserializer)?.as_ref().and_then(value_as_string);
    Ok(s.filter(|s| !s.trim().is_empty()))
}

/// Builds a canonical event, dropping vendor events without a usable timestamp.
pub(crate) fn event(
    timestamp: Option<DateTime<Utc>>,
    status: ShipmentStatus,
    description: Option<String>,
    location: Option<String>,
) -> Option<CourierEvent> {
    let timestamp = timestamp?;
    let location = location.filter(|l| !l.trim().is_empty());
    Some(CourierEvent { timestamp, status, description: description.unwrap_or_default(), location })
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn resolve_carrier_names() {
        assert_eq!(Courier::resolve("PostNL"), Some(Courier::PostNl));
        assert_eq!(Courier::resolve("Post-NL Pakket"), Some(Courier::PostNl));
        assert_eq!(Courier::resolve("DHL Express"), Some(Courier::Dhl));
        assert_eq!(Courier::resolve("dpd"), Some(Courier::Dpd));
        assert_eq!(Courier::resolve("United Parcel Service"), Some(Courier::Ups));
        assert_eq!(Courier::resolve("FedEx Ground"), Some(Courier::FedEx));
        assert_eq!(Courier::resolve("Federal Express"), Some(Courier::FedEx));
        assert_eq!(Courier::resolve("General Logistics Systems"), Some(Courier::Gls));
        assert_eq!(Courier::resolve("Royal Mail"), None);
        assert_eq!(Courier::resolve("  "), None);
    }

    #[test]
    fn status_codes_classify_errors() {
        assert!(matches!(CourierError::from_status(Courier::Dhl, 401, ""), CourierError::Auth(_)));
        assert!(matches!(CourierError::from_status(Courier::Dhl, 403, ""), CourierError::Auth(_)));
        assert!(matches!(CourierError::from_status(Courier::Dhl, 404, ""), CourierError::NotFound(_)));
        assert!(matches!(CourierError::from_status(Courier::Dhl, 429, ""), CourierError::RateLimited(_)));
        assert!(matches!(CourierError::from_status(Courier::Dhl, 503, ""), CourierError::Upstream(_)));
    }

    #[test]
    fn finalize_sorts_events_and_derives_location() {
        let t = |h| Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap();
        let mut response = CourierTrackingResponse::new(Courier::Gls, "123", ShipmentStatus::InTransit);
        response.events = vec![
            event(Some(t(12)), ShipmentStatus::InTransit, None, Some("Utrecht".into())).unwrap(),
            event(Some(t(8)), ShipmentStatus::Pending, None, Some("Amsterdam".into())).unwrap(),
        ];
        let response = response.finalize();
        assert_eq!(response.events[0].timestamp, t(8));
        assert_eq!(response.current_location.as_deref(), Some("Utrecht"));
        assert!(event(None, ShipmentStatus::Pending, None, None).is_none());
    }
}

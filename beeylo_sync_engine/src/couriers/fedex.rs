use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use shopify_tools::helpers::lenient_timestamp;

use super::{
    decode,
    event,
    http_client,
    lenient_string,
    oauth::TokenResponse,
    read_json,
    request_failed,
    Courier,
    CourierClient,
    CourierError,
    CourierTrackingResponse,
    OAuthClientConfig,
    OAuthTokenCache,
    ProofOfDelivery,
};
use crate::db_types::ShipmentStatus;

pub fn map_status(code: &str) -> ShipmentStatus {
    match code.trim().to_ascii_uppercase().as_str() {
        "OC" => ShipmentStatus::Pending,
        "PU" | "IT" | "AR" => ShipmentStatus::InTransit,
        "OD" => ShipmentStatus::OutForDelivery,
        "DL" => ShipmentStatus::Delivered,
        "DE" => ShipmentStatus::Failure,
        "HL" => ShipmentStatus::AvailableForPickup,
        "RS" => ShipmentStatus::ReturnToSender,
        _ => ShipmentStatus::Unknown,
    }
}

#[derive(Debug, Default, Deserialize)]
struct FedExResponse {
    #[serde(default)]
    output: Option<FedExOutput>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FedExOutput {
    #[serde(default)]
    complete_track_results: Vec<FedExCompleteResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FedExCompleteResult {
    #[serde(default)]
    track_results: Vec<FedExTrackResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FedExTrackResult {
    #[serde(default)]
    scan_events: Vec<FedExScanEvent>,
    #[serde(default)]
    latest_status_detail: Option<FedExStatusDetail>,
    #[serde(default)]
    estimated_delivery_time_window: Option<FedExWindowHolder>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    actual_delivery_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    delivery_details: Option<FedExDeliveryDetails>,
    #[serde(default)]
    error: Option<FedExError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FedExScanEvent {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_string")]
    event_type: Option<String>,
    #[serde(default)]
    event_description: Option<String>,
    #[serde(default)]
    scan_location: Option<FedExLocation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FedExStatusDetail {
    #[serde(default, deserialize_with = "lenient_string")]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    scan_location: Option<FedExLocation>,
}

#[derive(Debug, Default, Deserialize)]
struct FedExLocation {
    #[serde(default)]
    city: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FedExWindowHolder {
    #[serde(default)]
    window: Option<FedExWindow>,
}

#[derive(Debug, Default, Deserialize)]
struct FedExWindow {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    begins: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FedExDeliveryDetails {
    #[serde(default)]
    received_by_name: Option<String>,
    #[serde(default)]
    signature_image_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FedExError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Translates a FedEx track-by-number response. FedEx reports unknown numbers as an error inside a 200 response.
pub fn parse_response(tracking_number: &str, body: Value) -> Result<CourierTrackingResponse, CourierError> {
    let data: FedExResponse = decode(Courier::FedEx, body)?;
    let result = data
        .output
        .and_then(|o| o.complete_track_results.into_iter().next())
        .and_then(|c| c.track_results.into_iter().next())
        .ok_or_else(|| CourierError::NotFound(format!("FedEx has no results for {tracking_number}")))?;
    if let Some(err) = result.error {
        let code = err.code.unwrap_or_default();
        let detail = format!("FedEx: {code} {}", err.message.unwrap_or_default());
        return if code.contains("NOTFOUND") {
            Err(CourierError::NotFound(detail))
        } else {
            Err(CourierError::InvalidResponse(detail))
        };
    }
    let latest = result.latest_status_detail.unwrap_or_default();
    let status = map_status(latest.code.as_deref().unwrap_or_default());
    let mut response = CourierTrackingResponse::new(Courier::FedEx, tracking_number, status);
    response.status_description = latest.description.unwrap_or_default();
    response.current_location = latest.scan_location.and_then(|l| l.city);
    response.events = result
        .scan_events
        .into_iter()
        .filter_map(|e| {
            let status = map_status(e.event_type.as_deref().unwrap_or_default());
            event(e.date, status, e.event_description, e.scan_location.and_then(|l| l.city))
        })
        .collect();
    response.estimated_delivery = result.estimated_delivery_time_window.and_then(|w| w.window).and_then(|w| w.begins);
    response.actual_delivery = result.actual_delivery_timestamp;
    response.proof_of_delivery = result.delivery_details.and_then(|d| {
        let receiver = d.received_by_name.filter(|r| !r.trim().is_empty())?;
        Some(ProofOfDelivery {
            signature_url: d.signature_image_url,
            photo_url: None,
            receiver_name: Some(receiver),
            timestamp: result.actual_delivery_timestamp,
        })
    });
    Ok(response.finalize())
}

pub struct FedExClient {
    client: Client,
    config: OAuthClientConfig,
    tokens: Arc<OAuthTokenCache>,
}

impl FedExClient {
    pub fn new(config: OAuthClientConfig) -> Result<Self, CourierError> {
        if !config.is_enabled() {
            return Err(CourierError::NotConfigured("FedEx client credentials are not set".into()));
        }
        Ok(Self { client: http_client()?, config, tokens: Arc::new(OAuthTokenCache::new()) })
    }

    async fn request_token(&self) -> Result<TokenResponse, CourierError> {
        debug!("🚚️ Requesting a FedEx access token");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.reveal().as_str()),
        ];
        let response = self
            .client
            .post(format!("{}/oauth/token", self.config.base_url))
            .form(&form)
            .send()
            .await
            .map_err(|e| request_failed(Courier::FedEx, e))?;
        let body = read_json(Courier::FedEx, response).await?;
        decode(Courier::FedEx, body)
    }

    async fn try_fetch(&self, tracking_number: &str) -> Result<CourierTrackingResponse, CourierError> {
        let token = self.tokens.get_or_fetch(|| self.request_token()).await?;
        let request = json!({
            "includeDetailedScans": true,
            "trackingInfo": [{"trackingNumberInfo": {"trackingNumber": tracking_number}}]
        });
        let response = self
            .client
            .post(format!("{}/track/v1/trackingnumbers", self.config.base_url))
            .bearer_auth(token.reveal())
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| request_failed(Courier::FedEx, e))?;
        let body = read_json(Courier::FedEx, response).await?;
        parse_response(tracking_number, body)
    }
}

#[async_trait]
impl CourierClient for FedExClient {
    fn courier(&self) -> Courier {
        Courier::FedEx
    }

    async fn fetch_tracking(&self, tracking_number: &str) -> Result<CourierTrackingResponse, CourierError> {
        debug!("🚚️ Fetching FedEx tracking for {tracking_number}");
        match self.try_fetch(tracking_number).await {
            Err(CourierError::Auth(e)) => {
                warn!("🚚️ FedEx rejected the access token. Refreshing it and trying again. {e}");
                self.tokens.invalidate().await;
                self.try_fetch(tracking_number).await
            },
            result => result,
        }
    }
}

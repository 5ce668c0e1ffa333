use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use shopify_tools::helpers::parse_timestamp;

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
        "I" => ShipmentStatus::Pending,
        "M" => ShipmentStatus::InTransit,
        "X" => ShipmentStatus::OutForDelivery,
        "D" => ShipmentStatus::Delivered,
        "P" => ShipmentStatus::AvailableForPickup,
        "RS" => ShipmentStatus::ReturnToSender,
        _ => ShipmentStatus::Unknown,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsResponse {
    #[serde(default)]
    track_response: Option<UpsTrackResponse>,
}

#[derive(Debug, Default, Deserialize)]
struct UpsTrackResponse {
    #[serde(default)]
    shipment: Vec<UpsShipment>,
}

#[derive(Debug, Default, Deserialize)]
struct UpsShipment {
    #[serde(default)]
    package: Vec<UpsPackage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsPackage {
    #[serde(default)]
    activity: Vec<UpsActivity>,
    #[serde(default)]
    current_status: Option<UpsStatus>,
    #[serde(default)]
    delivery_date: Vec<UpsDate>,
    #[serde(default)]
    delivery_information: Option<UpsDeliveryInformation>,
}

#[derive(Debug, Default, Deserialize)]
struct UpsActivity {
    #[serde(default, deserialize_with = "lenient_string")]
    date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    time: Option<String>,
    #[serde(default)]
    status: Option<UpsStatus>,
    #[serde(default)]
    location: Option<UpsLocation>,
}

#[derive(Debug, Default, Deserialize)]
struct UpsStatus {
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    kind: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<UpsLocation>,
}

#[derive(Debug, Default, Deserialize)]
struct UpsLocation {
    #[serde(default)]
    address: Option<UpsAddress>,
}

impl UpsLocation {
    fn city(self) -> Option<String> {
        self.address.and_then(|a| a.city)
    }
}

#[derive(Debug, Default, Deserialize)]
struct UpsAddress {
    #[serde(default)]
    city: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UpsDate {
    #[serde(default, deserialize_with = "lenient_string")]
    date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsDeliveryInformation {
    #[serde(default)]
    received_by: Option<String>,
}

/// UPS reports dates as `YYYYMMDD` and times as `HHMMSS`, in separate fields.
fn ups_timestamp(date: Option<&str>, time: Option<&str>) -> Option<DateTime<Utc>> {
    let date = date?.trim();
    let time = time.map(str::trim).filter(|t| !t.is_empty()).unwrap_or("000000");
    parse_timestamp(&format!("{date}{time}")).or_else(|| parse_timestamp(date))
}

/// Translates a UPS track response. Only the first package of the first shipment is considered.
pub fn parse_response(tracking_number: &str, body: Value) -> Result<CourierTrackingResponse, CourierError> {
    let data: UpsResponse = decode(Courier::Ups, body)?;
    let package = data
        .track_response
        .and_then(|t| t.shipment.into_iter().next())
        .and_then(|s| s.package.into_iter().next())
        .ok_or_else(|| CourierError::NotFound(format!("UPS has no package for {tracking_number}")))?;
    let current = package.current_status.unwrap_or_default();
    let status = map_status(current.kind.as_deref().unwrap_or_default());
    let mut response = CourierTrackingResponse::new(Courier::Ups, tracking_number, status);
    response.status_description = current.description.unwrap_or_default();
    response.current_location = current.location.and_then(UpsLocation::city);
    response.events = package
        .activity
        .into_iter()
        .filter_map(|a| {
            let timestamp = ups_timestamp(a.date.as_deref(), a.time.as_deref());
            let (status, description) = match a.status {
                Some(s) => (map_status(s.kind.as_deref().unwrap_or_default()), s.description),
                None => (ShipmentStatus::Unknown, None),
            };
            event(timestamp, status, description, a.location.and_then(UpsLocation::city))
        })
        .collect();
    let delivery_date = package.delivery_date.into_iter().next().and_then(|d| ups_timestamp(d.date.as_deref(), None));
    response.estimated_delivery = delivery_date;
    let received_by = package.delivery_information.and_then(|d| d.received_by).filter(|r| !r.trim().is_empty());
    if let Some(receiver) = received_by {
        response.actual_delivery = delivery_date;
        response.proof_of_delivery = Some(ProofOfDelivery {
            signature_url: None,
            photo_url: None,
            receiver_name: Some(receiver),
            timestamp: delivery_date,
        });
    }
    Ok(response.finalize())
}

pub struct UpsClient {
    client: Client,
    config: OAuthClientConfig,
    tokens: Arc<OAuthTokenCache>,
}

impl UpsClient {
    pub fn new(config: OAuthClientConfig) -> Result<Self, CourierError> {
        if !config.is_enabled() {
            return Err(CourierError::NotConfigured("UPS client credentials are not set".into()));
        }
        Ok(Self { client: http_client()?, config, tokens: Arc::new(OAuthTokenCache::new()) })
    }

    async fn request_token(&self) -> Result<TokenResponse, CourierError> {
        debug!("🚚️ Requesting a UPS access token");
        let response = self
            .client
            .post(format!("{}/security/v1/oauth/token", self.config.base_url))
            .basic_auth(&self.config.client_id, Some(self.config.client_secret.reveal()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| request_failed(Courier::Ups, e))?;
        let body = read_json(Courier::Ups, response).await?;
        decode(Courier::Ups, body)
    }

    async fn try_fetch(&self, tracking_number: &str) -> Result<CourierTrackingResponse, CourierError> {
        let token = self.tokens.get_or_fetch(|| self.request_token()).await?;
        let response = self
            .client
            .get(format!("{}/api/track/v1/details/{tracking_number}", self.config.base_url))
            .bearer_auth(token.reveal())
            .header("Accept", "application/json")
            .header("transId", tracking_number)
            .header("transactionSrc", "beeylo")
            .send()
            .await
            .map_err(|e| request_failed(Courier::Ups, e))?;
        let body = read_json(Courier::Ups, response).await?;
        parse_response(tracking_number, body)
    }
}

#[async_trait]
impl CourierClient for UpsClient {
    fn courier(&self) -> Courier {
        Courier::Ups
    }

    /// A rejected token is dropped and the request retried once with a fresh one.
    async fn fetch_tracking(&self, tracking_number: &str) -> Result<CourierTrackingResponse, CourierError> {
        debug!("🚚️ Fetching UPS tracking for {tracking_number}");
        match self.try_fetch(tracking_number).await {
            Err(CourierError::Auth(e)) => {
                warn!("🚚️ UPS rejected the access token. Refreshing it and trying again. {e}");
                self.tokens.invalidate().await;
                self.try_fetch(tracking_number).await
            },
            result => result,
        }
    }
}

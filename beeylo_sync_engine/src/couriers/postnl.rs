use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use shopify_tools::helpers::lenient_timestamp;

use super::{
    decode,
    event,
    http_client,
    lenient_string,
    read_json,
    request_failed,
    ApiKeyConfig,
    Courier,
    CourierClient,
    CourierError,
    CourierTrackingResponse,
    ProofOfDelivery,
};
use crate::db_types::ShipmentStatus;

pub fn map_status(code: &str) -> ShipmentStatus {
    match code.trim() {
        "1" => ShipmentStatus::Pending,
        "2" | "3" | "4" => ShipmentStatus::InTransit,
        "5" => ShipmentStatus::OutForDelivery,
        "6" => ShipmentStatus::Delivered,
        "7" => ShipmentStatus::Failure,
        "8" => ShipmentStatus::AvailableForPickup,
        "9" => ShipmentStatus::ReturnToSender,
        _ => ShipmentStatus::Unknown,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostNlResponse {
    #[serde(default)]
    current_status: Option<PostNlStatus>,
    #[serde(default)]
    status_history: Vec<PostNlStatus>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    expected_delivery_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    actual_delivery_date: Option<DateTime<Utc>>,
    #[serde(default)]
    signature: Option<PostNlSignature>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PostNlStatus {
    #[serde(default, deserialize_with = "lenient_string")]
    status_code: Option<String>,
    #[serde(default)]
    status_description: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    time_stamp: Option<DateTime<Utc>>,
    #[serde(default)]
    location_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostNlSignature {
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    receiver_name: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Translates a PostNL shipment status document.
pub fn parse_response(tracking_number: &str, body: Value) -> Result<CourierTrackingResponse, CourierError> {
    let data: PostNlResponse = decode(Courier::PostNl, body)?;
    let current = data.current_status.unwrap_or_default();
    let status = map_status(current.status_code.as_deref().unwrap_or_default());
    let mut response = CourierTrackingResponse::new(Courier::PostNl, tracking_number, status);
    response.status_description = current.status_description.unwrap_or_default();
    response.events = data
        .status_history
        .into_iter()
        .filter_map(|e| {
            let status = map_status(e.status_code.as_deref().unwrap_or_default());
            event(e.time_stamp, status, e.status_description, e.location_code)
        })
        .collect();
    response.estimated_delivery = data.expected_delivery_date;
    response.actual_delivery = data.actual_delivery_date;
    response.proof_of_delivery = data
        .signature
        .map(|s| (non_blank(s.image_url), non_blank(s.receiver_name)))
        .filter(|(image_url, receiver_name)| image_url.is_some() || receiver_name.is_some())
        .map(|(signature_url, receiver_name)| ProofOfDelivery {
            signature_url,
            photo_url: None,
            receiver_name,
            timestamp: data.actual_delivery_date,
        });
    Ok(response.finalize())
}

pub struct PostNlClient {
    client: Client,
    config: ApiKeyConfig,
}

impl PostNlClient {
    pub fn new(config: ApiKeyConfig) -> Result<Self, CourierError> {
        if !config.is_enabled() {
            return Err(CourierError::NotConfigured("PostNL API key is not set".into()));
        }
        Ok(Self { client: http_client()?, config })
    }
}

#[async_trait]
impl CourierClient for PostNlClient {
    fn courier(&self) -> Courier {
        Courier::PostNl
    }

    async fn fetch_tracking(&self, tracking_number: &str) -> Result<CourierTrackingResponse, CourierError> {
        let url = format!("{}/{tracking_number}", self.config.base_url);
        debug!("🚚️ Fetching PostNL tracking for {tracking_number}");
        let response = self
            .client
            .get(url)
            .header("apikey", self.config.api_key.reveal().as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| request_failed(Courier::PostNl, e))?;
        let body = read_json(Courier::PostNl, response).await?;
        parse_response(tracking_number, body)
    }
}

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
    match code.trim().to_ascii_uppercase().as_str() {
        "COLLECTED" | "AT_DEPOT" | "IN_TRANSIT" => ShipmentStatus::InTransit,
        "OUT_FOR_DELIVERY" => ShipmentStatus::OutForDelivery,
        "DELIVERED" => ShipmentStatus::Delivered,
        "DELIVERY_FAILED" => ShipmentStatus::Failure,
        "RETURNED" => ShipmentStatus::ReturnToSender,
        _ => ShipmentStatus::Unknown,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DpdResponse {
    #[serde(default, deserialize_with = "lenient_string")]
    current_status: Option<String>,
    #[serde(default)]
    current_status_description: Option<String>,
    #[serde(default)]
    parcel_life_cycle_data: Vec<DpdEvent>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    predicted_delivery_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    delivery_date: Option<DateTime<Utc>>,
    #[serde(default)]
    proof_of_delivery: Option<DpdProofOfDelivery>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DpdEvent {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_string")]
    status_code: Option<String>,
    #[serde(default)]
    status_description: Option<String>,
    #[serde(default)]
    depot: Option<DpdDepot>,
}

#[derive(Debug, Default, Deserialize)]
struct DpdDepot {
    #[serde(default)]
    city: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DpdProofOfDelivery {
    #[serde(default)]
    signature_url: Option<String>,
    #[serde(default)]
    recipient_name: Option<String>,
}

pub fn parse_response(tracking_number: &str, body: Value) -> Result<CourierTrackingResponse, CourierError> {
    let data: DpdResponse = decode(Courier::Dpd, body)?;
    let status = map_status(data.current_status.as_deref().unwrap_or_default());
    let mut response = CourierTrackingResponse::new(Courier::Dpd, tracking_number, status);
    response.status_description = data.current_status_description.unwrap_or_default();
    response.events = data
        .parcel_life_cycle_data
        .into_iter()
        .filter_map(|e| {
            let status = map_status(e.status_code.as_deref().unwrap_or_default());
            event(e.date, status, e.status_description, e.depot.and_then(|d| d.city))
        })
        .collect();
    response.estimated_delivery = data.predicted_delivery_date;
    response.actual_delivery = data.delivery_date;
    response.proof_of_delivery = data
        .proof_of_delivery
        .filter(|p| p.signature_url.is_some() || p.recipient_name.is_some())
        .map(|p| ProofOfDelivery {
            signature_url: p.signature_url,
            photo_url: None,
            receiver_name: p.recipient_name,
            timestamp: data.delivery_date,
        });
    Ok(response.finalize())
}

pub struct DpdClient {
    client: Client,
    config: ApiKeyConfig,
}

impl DpdClient {
    pub fn new(config: ApiKeyConfig) -> Result<Self, CourierError> {
        if !config.is_enabled() {
            return Err(CourierError::NotConfigured("DPD API key is not set".into()));
        }
        Ok(Self { client: http_client()?, config })
    }
}

#[async_trait]
impl CourierClient for DpdClient {
    fn courier(&self) -> Courier {
        Courier::Dpd
    }

    async fn fetch_tracking(&self, tracking_number: &str) -> Result<CourierTrackingResponse, CourierError> {
        let url = format!("{}/parcels/{tracking_number}", self.config.base_url);
        debug!("🚚️ Fetching DPD tracking for {tracking_number}");
        let response = self
            .client
            .get(url)
            .bearer_auth(self.config.api_key.reveal())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| request_failed(Courier::Dpd, e))?;
        let body = read_json(Courier::Dpd, response).await?;
        parse_response(tracking_number, body)
    }
}

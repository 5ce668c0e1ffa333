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
    read_json,
    request_failed,
    BasicAuthConfig,
    Courier,
    CourierClient,
    CourierError,
    CourierTrackingResponse,
    ProofOfDelivery,
};
use crate::db_types::ShipmentStatus;

pub fn map_status(code: &str) -> ShipmentStatus {
    match code.trim().to_ascii_uppercase().as_str() {
        "PREADVICE" => ShipmentStatus::Pending,
        "COLLECTED" | "IN_TRANSIT" | "AT_DEPOT" | "AT_HUB" => ShipmentStatus::InTransit,
        "OUT_FOR_DELIVERY" => ShipmentStatus::OutForDelivery,
        "DELIVERED" | "COLLECTED_BY_RECIPIENT" => ShipmentStatus::Delivered,
        "DELIVERY_FAILED" | "EXCEPTION" | "DAMAGED" | "LOST" => ShipmentStatus::Failure,
        "AWAITING_COLLECTION" => ShipmentStatus::AvailableForPickup,
        "RETURNED" => ShipmentStatus::ReturnToSender,
        "CANCELLED" => ShipmentStatus::Cancelled,
        _ => ShipmentStatus::Unknown,
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GlsResponse {
    #[serde(default)]
    parcel_status_list: Vec<GlsParcelStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GlsParcelStatus {
    #[serde(default, deserialize_with = "lenient_string")]
    parcel_number: Option<String>,
    #[serde(default)]
    events: Vec<GlsEvent>,
    #[serde(default)]
    status_info: Option<GlsStatusInfo>,
    #[serde(default)]
    depot_info: Option<GlsDepotInfo>,
    #[serde(default)]
    delivery_info: Option<GlsDeliveryInfo>,
    #[serde(default, rename = "PODInfo")]
    pod_info: Option<GlsPodInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GlsEvent {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_string")]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GlsStatusInfo {
    #[serde(default, deserialize_with = "lenient_string")]
    status_code: Option<String>,
    #[serde(default)]
    status_text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GlsDepotInfo {
    #[serde(default)]
    depot_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GlsDeliveryInfo {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    estimated_delivery_date: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    actual_delivery_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GlsPodInfo {
    #[serde(default)]
    signature_available: bool,
    #[serde(default)]
    signature_url: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    receiver_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    delivery_date: Option<DateTime<Utc>>,
}

pub fn parse_response(tracking_number: &str, body: Value) -> Result<CourierTrackingResponse, CourierError> {
    let data: GlsResponse = decode(Courier::Gls, body)?;
    let parcel = data
        .parcel_status_list
        .into_iter()
        .next()
        .ok_or_else(|| CourierError::NotFound(format!("GLS has no status for parcel {tracking_number}")))?;
    let info = parcel.status_info.unwrap_or_default();
    let status = map_status(info.status_code.as_deref().unwrap_or_default());
    let number = parcel.parcel_number.unwrap_or_else(|| tracking_number.to_string());
    let mut response = CourierTrackingResponse::new(Courier::Gls, &number, status);
    response.status_description = info.status_text.unwrap_or_default();
    response.current_location = parcel.depot_info.and_then(|d| d.depot_name);
    response.events = parcel
        .events
        .into_iter()
        .filter_map(|e| {
            let status = map_status(e.code.as_deref().unwrap_or_default());
            event(e.date, status, e.description, e.location)
        })
        .collect();
    let delivery = parcel.delivery_info.unwrap_or_default();
    response.estimated_delivery = delivery.estimated_delivery_date;
    response.actual_delivery = delivery.actual_delivery_date;
    response.proof_of_delivery = parcel.pod_info.filter(|p| p.signature_available).map(|p| ProofOfDelivery {
        signature_url: p.signature_url,
        photo_url: p.photo_url,
        receiver_name: p.receiver_name,
        timestamp: p.delivery_date,
    });
    Ok(response.finalize())
}

pub struct GlsClient {
    client: Client,
    config: BasicAuthConfig,
}

impl GlsClient {
    pub fn new(config: BasicAuthConfig) -> Result<Self, CourierError> {
        if !config.is_enabled() {
            return Err(CourierError::NotConfigured("GLS username and password are not set".into()));
        }
        Ok(Self { client: http_client()?, config })
    }
}

#[async_trait]
impl CourierClient for GlsClient {
    fn courier(&self) -> Courier {
        Courier::Gls
    }

    async fn fetch_tracking(&self, tracking_number: &str) -> Result<CourierTrackingResponse, CourierError> {
        debug!("🚚️ Fetching GLS status for parcel {tracking_number}");
        let response = self
            .client
            .post(format!("{}/ParcelService.svc/json/GetParcelStatuses", self.config.base_url))
            .basic_auth(&self.config.username, Some(self.config.password.reveal()))
            .header("Accept", "application/json")
            .json(&json!({"ParcelNumber": tracking_number}))
            .send()
            .await
            .map_err(|e| request_failed(Courier::Gls, e))?;
        let body = read_json(Courier::Gls, response).await?;
        parse_response(tracking_number, body)
    }
}

#[cfg(test)]
mod test {
    use wiremock::{
        matchers::{header_exists, method, path},
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;

    fn fixture(code: &str) -> Value {
        json!({"ParcelStatusList": [{
            "ParcelNumber": 55512345,
            "StatusInfo": {"StatusCode": code, "StatusText": "Status"},
            "Events": [
                {"Date": "2024-05-01T12:00:00", "Code": "AT_HUB", "Description": "Hub scan", "Location": "Budapest"},
                {"Date": "2024-05-01T06:00:00", "Code": "PREADVICE", "Description": "Data received"}
            ],
            "DeliveryInfo": {"EstimatedDeliveryDate": "2024-05-02", "ActualDeliveryDate": null},
            "PODInfo": {"SignatureAvailable": false, "ReceiverName": "Nobody"}
        }]})
    }

    #[test]
    fn every_known_code_maps() {
        let table = [
            ("PREADVICE", ShipmentStatus::Pending),
            ("COLLECTED", ShipmentStatus::InTransit),
            ("IN_TRANSIT", ShipmentStatus::InTransit),
            ("AT_DEPOT", ShipmentStatus::InTransit),
            ("AT_HUB", ShipmentStatus::InTransit),
            ("OUT_FOR_DELIVERY", ShipmentStatus::OutForDelivery),
            ("DELIVERED", ShipmentStatus::Delivered),
            ("COLLECTED_BY_RECIPIENT", ShipmentStatus::Delivered),
            ("DELIVERY_FAILED", ShipmentStatus::Failure),
            ("EXCEPTION", ShipmentStatus::Failure),
            ("DAMAGED", ShipmentStatus::Failure),
            ("LOST", ShipmentStatus::Failure),
            ("AWAITING_COLLECTION", ShipmentStatus::AvailableForPickup),
            ("RETURNED", ShipmentStatus::ReturnToSender),
            ("CANCELLED", ShipmentStatus::Cancelled),
            ("BEAMED_UP", ShipmentStatus::Unknown),
        ];
        for (code, expected) in table {
            assert_eq!(parse_response("55512345", fixture(code)).unwrap().status, expected, "code {code}");
        }
    }

    #[test]
    fn pod_only_when_signature_available() {
        let response = parse_response("55512345", fixture("AT_HUB")).unwrap();
        assert!(response.proof_of_delivery.is_none());
        assert_eq!(response.tracking_number, "55512345");
        assert_eq!(response.current_location.as_deref(), Some("Budapest"));
        assert_eq!(response.events[0].status, ShipmentStatus::Pending);
    }

    #[tokio::test]
    async fn uses_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ParcelService.svc/json/GetParcelStatuses"))
            .and(header_exists("Authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixture("DELIVERED")))
            .mount(&server)
            .await;
        let client = GlsClient::new(BasicAuthConfig::new("user", "pass", &server.uri())).unwrap();
        assert_eq!(client.fetch_tracking("55512345").await.unwrap().status, ShipmentStatus::Delivered);
    }
}

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
    match code.trim().to_ascii_lowercase().as_str() {
        "pre-transit" => ShipmentStatus::Pending,
        "transit" => ShipmentStatus::InTransit,
        "delivered" => ShipmentStatus::Delivered,
        "failure" => ShipmentStatus::Failure,
        _ => ShipmentStatus::Unknown,
    }
}

#[derive(Debug, Default, Deserialize)]
struct DhlResponse {
    #[serde(default)]
    shipments: Vec<DhlShipment>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DhlShipment {
    #[serde(default)]
    status: Option<DhlEvent>,
    #[serde(default)]
    events: Vec<DhlEvent>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    estimated_time_of_delivery: Option<DateTime<Utc>>,
    #[serde(default)]
    details: Option<DhlDetails>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DhlEvent {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_string")]
    status_code: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    location: Option<DhlLocation>,
}

impl DhlEvent {
    fn locality(&self) -> Option<String> {
        self.location.as_ref().and_then(|l| l.address.as_ref()).and_then(|a| a.address_locality.clone())
    }
}

#[derive(Debug, Default, Deserialize)]
struct DhlLocation {
    #[serde(default)]
    address: Option<DhlAddress>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DhlAddress {
    #[serde(default)]
    address_locality: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DhlDetails {
    #[serde(default)]
    proof_of_delivery: Option<DhlProofOfDelivery>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DhlProofOfDelivery {
    #[serde(default, deserialize_with = "lenient_timestamp")]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    signature_url: Option<String>,
    #[serde(default)]
    signed: Option<DhlSignee>,
}

#[derive(Debug, Default, Deserialize)]
struct DhlSignee {
    #[serde(default)]
    name: Option<String>,
}

/// Translates a DHL unified tracking response. Only the first shipment is considered.
pub fn parse_response(tracking_number: &str, body: Value) -> Result<CourierTrackingResponse, CourierError> {
    let data: DhlResponse = decode(Courier::Dhl, body)?;
    let shipment = data
        .shipments
        .into_iter()
        .next()
        .ok_or_else(|| CourierError::NotFound(format!("DHL has no shipment for {tracking_number}")))?;
    let current = shipment.status.unwrap_or_default();
    let status = map_status(current.status_code.as_deref().unwrap_or_default());
    let mut response = CourierTrackingResponse::new(Courier::Dhl, tracking_number, status);
    response.current_location = current.locality();
    response.status_description = current.description.unwrap_or_default();
    response.events = shipment
        .events
        .into_iter()
        .filter_map(|e| {
            let location = e.locality();
            let status = map_status(e.status_code.as_deref().unwrap_or_default());
            event(e.timestamp, status, e.description, location)
        })
        .collect();
    response.estimated_delivery = shipment.estimated_time_of_delivery;
    if let Some(pod) = shipment.details.and_then(|d| d.proof_of_delivery) {
        response.actual_delivery = pod.timestamp;
        response.proof_of_delivery = Some(ProofOfDelivery {
            signature_url: pod.signature_url,
            photo_url: None,
            receiver_name: pod.signed.and_then(|s| s.name),
            timestamp: pod.timestamp,
        });
    }
    Ok(response.finalize())
}

pub struct DhlClient {
    client: Client,
    config: ApiKeyConfig,
}

impl DhlClient {
    pub fn new(config: ApiKeyConfig) -> Result<Self, CourierError> {
        if !config.is_enabled() {
            return Err(CourierError::NotConfigured("DHL API key is not set".into()));
        }
        Ok(Self { client: http_client()?, config })
    }
}

#[async_trait]
impl CourierClient for DhlClient {
    fn courier(&self) -> Courier {
        Courier::Dhl
    }

    async fn fetch_tracking(&self, tracking_number: &str) -> Result<CourierTrackingResponse, CourierError> {
        debug!("🚚️ Fetching DHL tracking for {tracking_number}");
        let response = self
            .client
            .get(self.config.base_url.as_str())
            .query(&[("trackingNumber", tracking_number)])
            .header("DHL-API-Key", self.config.api_key.reveal().as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| request_failed(Courier::Dhl, e))?;
        let body = read_json(Courier::Dhl, response).await?;
        parse_response(tracking_number, body)
    }
}

#[cfg(test)]
mod test {
    use serde_json::json;
    use wiremock::{
        matchers::{header, method, query_param},
        Mock,
        MockServer,
        ResponseTemplate,
    };

    use super::*;

    fn fixture(code: &str) -> Value {
        json!({"shipments": [{
            "id": "00340434161094042557",
            "status": {"statusCode": code, "description": "Delivered", "location": {"address": {"addressLocality": "Bonn"}}},
            "events": [
                {"timestamp": "2024-05-02T09:00:00+02:00", "statusCode": "transit", "description": "Sorted",
                 "location": {"address": {"addressLocality": "Köln"}}},
                {"timestamp": "2024-05-01T09:00:00+02:00", "statusCode": "pre-transit", "description": "Label created"}
            ],
            "details": {"proofOfDelivery": {"timestamp": "2024-05-03T11:00:00Z", "signed": {"name": "M. Müller"}}}
        }]})
    }

    #[test]
    fn every_known_code_maps() {
        let table = [
            ("pre-transit", ShipmentStatus::Pending),
            ("transit", ShipmentStatus::InTransit),
            ("delivered", ShipmentStatus::Delivered),
            ("failure", ShipmentStatus::Failure),
            ("unknown", ShipmentStatus::Unknown),
            ("teleported", ShipmentStatus::Unknown),
        ];
        for (code, expected) in table {
            assert_eq!(parse_response("003404", fixture(code)).unwrap().status, expected, "code {code}");
        }
    }

    #[test]
    fn top_level_location_wins_and_pod_is_read() {
        let response = parse_response("003404", fixture("delivered")).unwrap();
        assert_eq!(response.current_location.as_deref(), Some("Bonn"));
        assert_eq!(response.events[0].status, ShipmentStatus::Pending);
        assert_eq!(response.events[1].location.as_deref(), Some("Köln"));
        assert_eq!(response.proof_of_delivery.unwrap().receiver_name.as_deref(), Some("M. Müller"));
        assert!(response.actual_delivery.is_some());
    }

    #[test]
    fn no_shipments_is_not_found() {
        let err = parse_response("003404", json!({"shipments": []})).unwrap_err();
        assert!(matches!(err, CourierError::NotFound(_)));
    }

    #[tokio::test]
    async fn sends_api_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("trackingNumber", "003404"))
            .and(header("DHL-API-Key", "dhl-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(fixture("transit")))
            .mount(&server)
            .await;
        let client = DhlClient::new(ApiKeyConfig::new("dhl-key", &server.uri())).unwrap();
        assert_eq!(client.fetch_tracking("003404").await.unwrap().status, ShipmentStatus::InTransit);
    }
}

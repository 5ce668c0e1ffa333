use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use beeylo_sync_engine::{
    traits::{QueueError, StoreError},
    SyncError,
    TrackingError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Missing request header: {0}")]
    MissingHeader(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The storefront could not be reached. {0}")]
    StorefrontUnavailable(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::MissingHeader(_) => StatusCode::BAD_REQUEST,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::StorefrontUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(s) => Self::NoRecordFound(s),
            e => Self::BackendError(e.to_string()),
        }
    }
}

impl From<QueueError> for ServerError {
    fn from(e: QueueError) -> Self {
        Self::BackendError(format!("Queue error: {e}"))
    }
}

impl From<SyncError> for ServerError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::NotFound(s) => Self::NoRecordFound(s),
            SyncError::InvalidPayload(s) => Self::InvalidRequestBody(s),
            SyncError::MissingPrimaryKey(_) => Self::InvalidRequestBody(e.to_string()),
            SyncError::Storefront(e) => Self::StorefrontUnavailable(e.to_string()),
            SyncError::Store(e) => e.into(),
            SyncError::Queue(e) => e.into(),
        }
    }
}

impl From<TrackingError> for ServerError {
    fn from(e: TrackingError) -> Self {
        match e {
            TrackingError::FulfillmentNotFound(id) => Self::NoRecordFound(format!("Fulfillment #{id}")),
            TrackingError::Store(e) => e.into(),
            TrackingError::Queue(e) => e.into(),
            TrackingError::Courier(e) => Self::BackendError(e.to_string()),
        }
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShopifyApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Invalid REST request: {0}")]
    RestRequestError(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
    #[error("Invalid GraphQL query: {0}")]
    InvalidGraphQL(String),
    #[error("GraphQL query failed: {0}")]
    GraphQLError(String),
    #[error("The response from Shopify was empty")]
    EmptyResponse,
}

impl ShopifyApiError {
    /// Shopify answers 429 when the store's API call bucket is drained, and 5xx when it is having a bad day.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueryError { status, .. } => *status == 429 || *status >= 500,
            Self::RestResponseError(_) => true,
            _ => false,
        }
    }
}

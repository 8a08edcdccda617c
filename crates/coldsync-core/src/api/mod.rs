//! Remote API contract consumed by the sync engine.

mod http;

pub use http::HttpRemoteApi;

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::{NewOperation, QueuedOperation};

/// One mutating call against the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub method: String,
    pub endpoint: String,
    pub payload: Value,
    /// Lets the server deduplicate replays of the same queued operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl From<&NewOperation> for ApiRequest {
    fn from(operation: &NewOperation) -> Self {
        Self {
            method: operation.method.clone(),
            endpoint: operation.endpoint.clone(),
            payload: operation.payload.clone(),
            idempotency_key: None,
        }
    }
}

impl From<&QueuedOperation> for ApiRequest {
    fn from(operation: &QueuedOperation) -> Self {
        Self {
            method: operation.method.clone(),
            endpoint: operation.endpoint.clone(),
            payload: operation.payload.clone(),
            idempotency_key: Some(operation.idempotency_key.clone()),
        }
    }
}

/// Successful backend response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: u16,
    pub data: Value,
}

impl ApiResponse {
    pub const fn new(status: u16, data: Value) -> Self {
        Self { status, data }
    }
}

/// Failure reported by a [`RemoteApi`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Transport failure: unreachable host, reset connection, timeout
    #[error("Network error: {0}")]
    Network(String),
    /// The server rejected the request
    #[error("API error ({status}): {message}")]
    Application { status: u16, message: String },
    /// The server holds a different version of the entity
    #[error("Version conflict")]
    Conflict { server_data: Value },
}

impl From<ApiError> for crate::Error {
    fn from(error: ApiError) -> Self {
        match error {
            ApiError::Network(message) => Self::Network(message),
            ApiError::Application { status, message } => Self::Application { status, message },
            // Callers that can record the conflict handle this variant first
            ApiError::Conflict { .. } => Self::Application {
                status: 409,
                message: "version conflict".to_string(),
            },
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Backend the sync engine replays operations against
///
/// Implementations only decide whether a call succeeded; no schema is
/// assumed on either outcome.
pub trait RemoteApi: Send + Sync + 'static {
    fn request(&self, request: ApiRequest) -> impl Future<Output = ApiResult<ApiResponse>> + Send;
}

/// Issue `request`, reporting an elapsed `timeout` as a network failure
pub async fn request_with_timeout<A: RemoteApi>(
    api: &A,
    request: ApiRequest,
    timeout: Duration,
) -> ApiResult<ApiResponse> {
    tokio::time::timeout(timeout, api.request(request))
        .await
        .unwrap_or_else(|_| {
            Err(ApiError::Network(format!(
                "request timed out after {}ms",
                timeout.as_millis()
            )))
        })
}

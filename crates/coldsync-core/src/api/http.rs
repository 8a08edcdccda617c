//! reqwest-backed [`RemoteApi`] for the dashboard backend.

use std::time::Duration;

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{ApiError, ApiRequest, ApiResponse, ApiResult, RemoteApi};
use crate::error::{Error, Result};
use crate::util::{error_excerpt, has_http_scheme, trimmed_non_empty};

const PROBE_TIMEOUT_SECS: u64 = 4;

#[derive(Clone)]
pub struct HttpRemoteApi {
    base_url: String,
    api_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemoteApi {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteApi")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpRemoteApi {
    pub fn new(base_url: impl Into<String>, api_token: Option<String>) -> Result<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|error| Error::Network(error.to_string()))?;
        Ok(Self {
            base_url,
            api_token: trimmed_non_empty(api_token),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the backend answers at all; any HTTP status counts as reachable
    pub async fn is_reachable(&self) -> bool {
        self.client
            .get(&self.base_url)
            .timeout(Duration::from_secs(PROBE_TIMEOUT_SECS))
            .send()
            .await
            .is_ok()
    }

    fn url_for(&self, endpoint: &str) -> String {
        let endpoint = endpoint.trim();
        if has_http_scheme(endpoint) {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }
}

impl RemoteApi for HttpRemoteApi {
    async fn request(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            ApiError::Application {
                status: StatusCode::BAD_REQUEST.as_u16(),
                message: format!("invalid HTTP method '{}'", request.method),
            }
        })?;

        let mut builder = self
            .client
            .request(method, self.url_for(&request.endpoint))
            .header(reqwest::header::ACCEPT, "application/json");
        if !request.payload.is_null() {
            builder = builder.json(&request.payload);
        }
        if let Some(key) = &request.idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|error| ApiError::Network(error.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| ApiError::Network(error.to_string()))?;

        if status.is_success() {
            return Ok(ApiResponse::new(status.as_u16(), parse_body(&body)));
        }
        if status == StatusCode::CONFLICT {
            return Err(ApiError::Conflict {
                server_data: parse_body(&body),
            });
        }
        Err(ApiError::Application {
            status: status.as_u16(),
            message: parse_api_error(status, &body),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_body(body: &str) -> Value {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(trimmed).unwrap_or_else(|_| Value::String(trimmed.to_string()))
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return error_excerpt(&message);
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        error_excerpt(trimmed)
    }
}

fn normalize_base_url(raw: String) -> Result<String> {
    let base_url = trimmed_non_empty(Some(raw))
        .ok_or_else(|| Error::InvalidInput("API base URL must not be empty".to_string()))?;
    if has_http_scheme(&base_url) {
        Ok(base_url.trim_end_matches('/').to_string())
    } else {
        Err(Error::InvalidInput(
            "API base URL must include http:// or https://".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalize_base_url_rejects_invalid_values() {
        assert!(normalize_base_url(String::new()).is_err());
        assert!(normalize_base_url("api.example.com".to_string()).is_err());
        assert_eq!(
            normalize_base_url("https://api.example.com/v1/".to_string()).unwrap(),
            "https://api.example.com/v1"
        );
    }

    #[test]
    fn url_for_joins_relative_endpoints() {
        let api = HttpRemoteApi::new("https://api.example.com/v1", None).unwrap();
        assert_eq!(
            api.url_for("/shipments/4"),
            "https://api.example.com/v1/shipments/4"
        );
        assert_eq!(api.url_for("alerts"), "https://api.example.com/v1/alerts");
        assert_eq!(
            api.url_for("https://other.example.com/x"),
            "https://other.example.com/x"
        );
    }

    #[test]
    fn parse_body_falls_back_to_text() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body(r#"{"id": 3}"#), json!({"id": 3}));
        assert_eq!(parse_body("accepted"), json!("accepted"));
    }

    #[test]
    fn parse_api_error_prefers_message_field() {
        assert_eq!(
            parse_api_error(StatusCode::UNPROCESSABLE_ENTITY, r#"{"message": "bad sku"}"#),
            "bad sku"
        );
        assert_eq!(
            parse_api_error(StatusCode::INTERNAL_SERVER_ERROR, ""),
            "HTTP 500"
        );
    }

    #[test]
    fn debug_redacts_token() {
        let api = HttpRemoteApi::new("https://api.example.com", Some("secret".to_string())).unwrap();
        let debug = format!("{api:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_method_is_rejected_without_network() {
        let api = HttpRemoteApi::new("http://127.0.0.1:9", None).unwrap();
        let error = api
            .request(ApiRequest {
                method: "BAD METHOD".to_string(),
                endpoint: "/x".to_string(),
                payload: Value::Null,
                idempotency_key: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(error, ApiError::Application { status: 400, .. }));
    }
}

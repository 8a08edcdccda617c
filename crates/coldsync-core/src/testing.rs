//! Scripted remote API for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use crate::api::{ApiError, ApiRequest, ApiResponse, ApiResult, RemoteApi};

/// Records every request and answers from a queue of scripted outcomes.
///
/// Once the script runs out every call succeeds with `200` and a null body.
#[derive(Clone, Default)]
pub struct ScriptedApi {
    requests: Arc<Mutex<Vec<ApiRequest>>>,
    outcomes: Arc<Mutex<VecDeque<ApiResult<ApiResponse>>>>,
    delay: Option<Duration>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before answering each call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_ok(&self, data: Value) {
        self.push(Ok(ApiResponse::new(200, data)));
    }

    pub fn push_network_error(&self) {
        self.push(Err(ApiError::Network("connection refused".to_string())));
    }

    pub fn push_conflict(&self, server_data: Value) {
        self.push(Err(ApiError::Conflict { server_data }));
    }

    pub fn push(&self, outcome: ApiResult<ApiResponse>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|request| request.endpoint)
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl RemoteApi for ScriptedApi {
    async fn request(&self, request: ApiRequest) -> ApiResult<ApiResponse> {
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let outcome = self.outcomes.lock().unwrap().pop_front();
        outcome.unwrap_or_else(|| Ok(ApiResponse::new(200, json!(null))))
    }
}

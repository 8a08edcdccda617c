//! Queued operation model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Retry ceiling applied to every queued operation
pub const MAX_RETRIES: u32 = 3;

/// Method used when a caller does not name one
pub const DEFAULT_METHOD: &str = "POST";

/// Kind of mutation an operation represents (informational only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(format!("unknown operation kind '{other}'")),
        }
    }
}

/// Lifecycle status of a queued operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Completed,
    Failed,
}

impl OperationStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// `completed` and `failed` never transition again
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown operation status '{other}'")),
        }
    }
}

/// A mutation requested by the application, not yet stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOperation {
    pub kind: OperationKind,
    pub endpoint: String,
    pub method: String,
    pub payload: Value,
    /// Predecessor that must be completed before this one is replayed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<i64>,
}

impl NewOperation {
    /// Create an operation using the default method
    pub fn new(kind: OperationKind, endpoint: impl Into<String>, payload: Value) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
            method: DEFAULT_METHOD.to_string(),
            payload,
            depends_on: None,
        }
    }

    pub fn create(endpoint: impl Into<String>, payload: Value) -> Self {
        Self::new(OperationKind::Create, endpoint, payload)
    }

    pub fn update(endpoint: impl Into<String>, payload: Value) -> Self {
        Self::new(OperationKind::Update, endpoint, payload).with_method("PUT")
    }

    pub fn delete(endpoint: impl Into<String>) -> Self {
        Self::new(OperationKind::Delete, endpoint, Value::Null).with_method("DELETE")
    }

    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into().trim().to_ascii_uppercase();
        self
    }

    /// Only replay this operation after `predecessor` has completed
    #[must_use]
    pub const fn after(mut self, predecessor: i64) -> Self {
        self.depends_on = Some(predecessor);
        self
    }
}

/// A durably stored operation awaiting (or done with) replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Store-assigned, monotonically increasing identifier
    pub id: i64,
    pub kind: OperationKind,
    pub endpoint: String,
    pub method: String,
    pub payload: Value,
    /// Sent with every replay so the server can drop duplicate deliveries
    pub idempotency_key: String,
    pub depends_on: Option<i64>,
    /// Enqueue timestamp (Unix ms)
    pub created_at: i64,
    pub status: OperationStatus,
    pub retries: u32,
    pub max_retries: u32,
    pub last_error: Option<String>,
    pub last_attempt: Option<i64>,
    pub completed_at: Option<i64>,
    /// Earliest replay time after a failure (Unix ms)
    pub next_attempt_at: Option<i64>,
}

impl QueuedOperation {
    /// Whether the retry backoff allows replay at `now_ms`
    pub fn is_due(&self, now_ms: i64) -> bool {
        self.next_attempt_at.map_or(true, |at| at <= now_ms)
    }

    /// The original request, as it would be enqueued again
    pub fn to_new_operation(&self) -> NewOperation {
        NewOperation {
            kind: self.kind,
            endpoint: self.endpoint.clone(),
            method: self.method.clone(),
            payload: self.payload.clone(),
            depends_on: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_operation_defaults_to_post() {
        let op = NewOperation::create("/shipments", json!({"sku": "A1"}));
        assert_eq!(op.method, "POST");
        assert_eq!(op.kind, OperationKind::Create);
        assert_eq!(op.depends_on, None);
    }

    #[test]
    fn with_method_normalizes_case() {
        let op = NewOperation::create("/x", Value::Null).with_method(" patch ");
        assert_eq!(op.method, "PATCH");
    }

    #[test]
    fn kind_and_status_parse_from_text() {
        assert_eq!("Update".parse::<OperationKind>(), Ok(OperationKind::Update));
        assert!("upsert".parse::<OperationKind>().is_err());
        assert_eq!(
            "failed".parse::<OperationStatus>(),
            Ok(OperationStatus::Failed)
        );
        assert!(OperationStatus::Completed.is_terminal());
        assert!(!OperationStatus::Pending.is_terminal());
    }

    #[test]
    fn status_serializes_lowercase() {
        let value = serde_json::to_value(OperationStatus::Pending).unwrap();
        assert_eq!(value, json!("pending"));
    }
}

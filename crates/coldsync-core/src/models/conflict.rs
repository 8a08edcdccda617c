//! Sync conflict model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Which side won once a conflict has been decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStrategy {
    /// Keep the local version
    Local,
    /// Keep the server version
    Server,
    /// Keep a caller-produced merge of both
    Merge,
}

impl ResolutionStrategy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Server => "server",
            Self::Merge => "merge",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "server" => Ok(Self::Server),
            "merge" => Ok(Self::Merge),
            other => Err(format!("unknown resolution strategy '{other}'")),
        }
    }
}

/// Recorded divergence between a local mutation and server-held state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Conflict row identifier
    pub id: i64,
    /// Data the local mutation tried to write
    pub local_data: Value,
    /// Data the server holds for the same entity
    pub server_data: Value,
    /// Operation that triggered detection
    pub operation: Value,
    /// Detection timestamp (unix ms)
    pub detected_at: i64,
    pub resolved: bool,
    pub resolution: Option<ResolutionStrategy>,
    pub resolved_data: Option<Value>,
    /// Resolution timestamp (unix ms)
    pub resolved_at: Option<i64>,
}

impl ConflictRecord {
    /// The data a resolution should keep when the caller supplies none
    pub fn default_resolution_data(&self, strategy: ResolutionStrategy) -> Option<Value> {
        match strategy {
            ResolutionStrategy::Local => Some(self.local_data.clone()),
            ResolutionStrategy::Server => Some(self.server_data.clone()),
            ResolutionStrategy::Merge => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn conflict() -> ConflictRecord {
        ConflictRecord {
            id: 1,
            local_data: json!({"temp_c": 4}),
            server_data: json!({"temp_c": 6}),
            operation: json!({"endpoint": "/readings/9"}),
            detected_at: 100,
            resolved: false,
            resolution: None,
            resolved_data: None,
            resolved_at: None,
        }
    }

    #[test]
    fn default_resolution_data_picks_side() {
        let record = conflict();
        assert_eq!(
            record.default_resolution_data(ResolutionStrategy::Local),
            Some(json!({"temp_c": 4}))
        );
        assert_eq!(
            record.default_resolution_data(ResolutionStrategy::Server),
            Some(json!({"temp_c": 6}))
        );
        assert_eq!(record.default_resolution_data(ResolutionStrategy::Merge), None);
    }

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!("SERVER".parse(), Ok(ResolutionStrategy::Server));
        assert!("lww".parse::<ResolutionStrategy>().is_err());
    }
}

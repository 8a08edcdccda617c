//! Cached entity model

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Last-known-good snapshot of one server-side resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedEntity {
    /// Application-chosen key, unique within the cache
    pub key: String,
    pub data: Value,
    /// Type tag used for bulk retrieval (e.g. `shipment`, `warehouse`)
    pub entity_type: String,
    /// Last write timestamp (Unix ms)
    pub updated_at: i64,
}

impl CachedEntity {
    /// Age of the snapshot relative to `now_ms`, never negative
    pub fn age_millis(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.updated_at).max(0)
    }
}

//! Runtime settings for the sync service.
//!
//! `SyncSettings` is serialized as JSON (every field defaulted) so clients can
//! embed it in their own config files and override individual values.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::MAX_RETRIES;

const DEFAULT_SYNC_INTERVAL_MS: u64 = 30_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RETRY_BACKOFF_BASE_MS: u64 = 2_000;
const DEFAULT_RETRY_BACKOFF_MAX_MS: u64 = 5 * 60 * 1_000;
const DEFAULT_COMPLETED_RETENTION_DAYS: u32 = 7;

const SYNC_INTERVAL_ENV: &str = "COLDSYNC_SYNC_INTERVAL_MS";
const REQUEST_TIMEOUT_ENV: &str = "COLDSYNC_REQUEST_TIMEOUT_MS";

/// Tunables for the background driver and the queue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SyncSettings {
    /// Delay between background drain passes
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u64,
    /// Upper bound for a single replay request
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// First retry delay; doubles per failed attempt. Zero retries on the next pass.
    #[serde(default = "default_retry_backoff_base_ms")]
    pub retry_backoff_base_ms: u64,
    #[serde(default = "default_retry_backoff_max_ms")]
    pub retry_backoff_max_ms: u64,
    /// How long completed operations are kept before cleanup
    #[serde(default = "default_completed_retention_days")]
    pub completed_retention_days: u32,
}

const fn default_sync_interval_ms() -> u64 {
    DEFAULT_SYNC_INTERVAL_MS
}

const fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

const fn default_retry_backoff_base_ms() -> u64 {
    DEFAULT_RETRY_BACKOFF_BASE_MS
}

const fn default_retry_backoff_max_ms() -> u64 {
    DEFAULT_RETRY_BACKOFF_MAX_MS
}

const fn default_completed_retention_days() -> u32 {
    DEFAULT_COMPLETED_RETENTION_DAYS
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_interval_ms: DEFAULT_SYNC_INTERVAL_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            retry_backoff_base_ms: DEFAULT_RETRY_BACKOFF_BASE_MS,
            retry_backoff_max_ms: DEFAULT_RETRY_BACKOFF_MAX_MS,
            completed_retention_days: DEFAULT_COMPLETED_RETENTION_DAYS,
        }
    }
}

impl SyncSettings {
    /// Load settings from a JSON file; a missing file yields defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let settings = serde_json::from_str::<Self>(&raw)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `COLDSYNC_*` environment overrides on top of the loaded values.
    #[must_use]
    pub fn apply_env_overrides(mut self) -> Self {
        if let Some(value) = env_millis(SYNC_INTERVAL_ENV) {
            self.sync_interval_ms = value;
        }
        if let Some(value) = env_millis(REQUEST_TIMEOUT_ENV) {
            self.request_timeout_ms = value;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.sync_interval_ms == 0 {
            return Err(Error::InvalidInput(
                "sync_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::InvalidInput(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.retry_backoff_max_ms < self.retry_backoff_base_ms {
            return Err(Error::InvalidInput(
                "retry_backoff_max_ms must not be below retry_backoff_base_ms".to_string(),
            ));
        }
        Ok(())
    }

    pub const fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub const fn completed_retention(&self) -> Duration {
        Duration::from_secs(self.completed_retention_days as u64 * 24 * 60 * 60)
    }

    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: MAX_RETRIES,
            backoff_base: Duration::from_millis(self.retry_backoff_base_ms),
            backoff_max: Duration::from_millis(self.retry_backoff_max_ms),
        }
    }

    /// Override the interval, typically from a command-line flag
    #[must_use]
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Retry on the very next pass instead of waiting (useful in tests)
    #[must_use]
    pub const fn without_backoff(mut self) -> Self {
        self.retry_backoff_base_ms = 0;
        self.retry_backoff_max_ms = 0;
        self
    }
}

/// Retry bookkeeping applied by the queue on failed replays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        SyncSettings::default().retry_policy()
    }
}

impl RetryPolicy {
    /// Delay before the next attempt after `retries` failures (exponential, capped)
    pub fn delay_after(&self, retries: u32) -> Duration {
        if retries == 0 || self.backoff_base.is_zero() {
            return Duration::ZERO;
        }
        let exponent = (retries - 1).min(16);
        self.backoff_base
            .saturating_mul(1_u32 << exponent)
            .min(self.backoff_max)
    }
}

fn env_millis(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            tracing::warn!("Ignoring invalid {name}={raw}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_documented_values() {
        let settings = SyncSettings::default();
        assert_eq!(settings.sync_interval(), Duration::from_secs(30));
        assert_eq!(settings.completed_retention(), Duration::from_secs(7 * 86_400));
        assert_eq!(settings.retry_policy().max_retries, 3);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let settings: SyncSettings = serde_json::from_str(r#"{"sync_interval_ms": 5000}"#).unwrap();
        assert_eq!(settings.sync_interval_ms, 5000);
        assert_eq!(settings.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let error = serde_json::from_str::<SyncSettings>(r#"{"max_retries": 9}"#).unwrap_err();
        assert!(error.to_string().contains("unknown field"));
    }

    #[test]
    fn load_from_missing_path_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SyncSettings::load_from_path(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, SyncSettings::default());
    }

    #[test]
    fn load_from_path_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.json");
        std::fs::write(&path, r#"{"sync_interval_ms": 0}"#).unwrap();
        assert!(matches!(
            SyncSettings::load_from_path(&path),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_after(0), Duration::ZERO);
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(5));
    }

    #[test]
    fn oversized_interval_saturates() {
        let settings = SyncSettings::default().with_sync_interval(Duration::MAX);
        assert_eq!(settings.sync_interval_ms, u64::MAX);
        let settings = SyncSettings::default().with_sync_interval(Duration::from_secs(90));
        assert_eq!(settings.sync_interval_ms, 90_000);
    }

    #[test]
    fn without_backoff_disables_delay() {
        let policy = SyncSettings::default().without_backoff().retry_policy();
        assert_eq!(policy.delay_after(2), Duration::ZERO);
    }
}

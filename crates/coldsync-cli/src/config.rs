//! Persistent CLI configuration.

use std::path::{Path, PathBuf};

use coldsync_core::util::{has_http_scheme, trimmed_non_empty};
use coldsync_core::SyncSettings;
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "cli-config.json";
const APP_DIR_NAME: &str = "coldsync";
const DB_FILE_NAME: &str = "coldsync.db";

pub const API_URL_ENV: &str = "COLDSYNC_API_URL";
pub const API_TOKEN_ENV: &str = "COLDSYNC_API_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CliConfig {
    #[serde(default = "default_config_version")]
    pub version: u32,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    #[serde(default)]
    pub sync: SyncSettings,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            version: default_config_version(),
            api_base_url: None,
            api_token: None,
            db_path: None,
            sync: SyncSettings::default(),
        }
    }
}

const fn default_config_version() -> u32 {
    1
}

pub fn default_config_path() -> Result<PathBuf, String> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or_else(|| "Failed to resolve CLI config directory".to_string())
}

pub fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .map_or_else(|| PathBuf::from("."), |dir| dir.join(APP_DIR_NAME))
        .join(DB_FILE_NAME)
}

impl CliConfig {
    pub fn load() -> Result<Self, String> {
        Self::load_from_path(&default_config_path()?)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("Failed to read config at {}: {}", path.display(), error))?;
        let mut config = serde_json::from_str::<Self>(&raw)
            .map_err(|error| format!("Failed to parse config at {}: {}", path.display(), error))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, String> {
        let path = default_config_path()?;
        self.save_to_path(&path)?;
        Ok(path)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                format!(
                    "Failed to create config directory {}: {}",
                    parent.display(),
                    error
                )
            })?;
        }

        let mut normalized = self.clone();
        normalized.normalize();
        normalized.validate()?;
        let serialized = serde_json::to_string_pretty(&normalized)
            .map_err(|error| format!("Failed to serialize config: {error}"))?;
        std::fs::write(path, serialized)
            .map_err(|error| format!("Failed to write config at {}: {}", path.display(), error))
    }

    /// Environment wins over the config file
    pub fn api_base_url(&self) -> Option<String> {
        trimmed_non_empty(std::env::var(API_URL_ENV).ok())
            .or_else(|| self.api_base_url.clone())
    }

    pub fn api_token(&self) -> Option<String> {
        trimmed_non_empty(std::env::var(API_TOKEN_ENV).ok()).or_else(|| self.api_token.clone())
    }

    /// `--db-path` first, then the config file, then the platform data directory
    pub fn resolve_db_path(&self, explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| self.db_path.clone())
            .unwrap_or_else(default_db_path)
    }

    /// File settings with `COLDSYNC_*` environment overrides applied
    pub fn sync_settings(&self) -> Result<SyncSettings, String> {
        let settings = self.sync.clone().apply_env_overrides();
        settings.validate().map_err(|error| error.to_string())?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), String> {
        if let Some(url) = &self.api_base_url {
            if !has_http_scheme(url) {
                return Err(format!(
                    "api_base_url must include http:// or https:// (got {url})"
                ));
            }
        }
        self.sync.validate().map_err(|error| error.to_string())
    }

    fn normalize(&mut self) {
        self.api_base_url = trimmed_non_empty(self.api_base_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        self.api_token = trimmed_non_empty(self.api_token.take());
    }
}

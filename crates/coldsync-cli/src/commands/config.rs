use std::path::PathBuf;

use coldsync_core::util::{has_http_scheme, trimmed_non_empty};
use serde::Serialize;

use crate::cli::ConfigCommands;
use crate::commands::common::CommandContext;
use crate::config::{default_config_path, CliConfig};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct EffectiveConfig {
    pub config_path: Option<String>,
    pub api_base_url: Option<String>,
    pub api_token: Option<&'static str>,
    pub db_path: String,
    pub sync: coldsync_core::SyncSettings,
}

pub fn run_config(
    command: ConfigCommands,
    cli_db_path: Option<PathBuf>,
    ctx: &CommandContext,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            api_base_url,
            api_token,
            sync_interval_ms,
            request_timeout_ms,
        } => {
            let updated = apply_config_init(
                ctx.config.clone(),
                api_base_url,
                api_token,
                cli_db_path,
                sync_interval_ms,
                request_timeout_ms,
            )?;
            let path = updated.save().map_err(CliError::Config)?;
            println!("Saved config to {}", path.display());
            Ok(())
        }
        ConfigCommands::Show => {
            let effective = effective_config(ctx);
            println!("{}", serde_json::to_string_pretty(&effective)?);
            Ok(())
        }
    }
}

pub fn apply_config_init(
    mut config: CliConfig,
    api_base_url: Option<String>,
    api_token: Option<String>,
    db_path: Option<PathBuf>,
    sync_interval_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
) -> Result<CliConfig, CliError> {
    if let Some(url) = trimmed_non_empty(api_base_url) {
        if !has_http_scheme(&url) {
            return Err(CliError::Config(
                "--api-base-url must include http:// or https://".to_string(),
            ));
        }
        config.api_base_url = Some(url);
    }
    if let Some(token) = trimmed_non_empty(api_token) {
        config.api_token = Some(token);
    }
    if let Some(path) = db_path {
        config.db_path = Some(path);
    }
    if let Some(interval) = sync_interval_ms {
        config.sync.sync_interval_ms = interval;
    }
    if let Some(timeout) = request_timeout_ms {
        config.sync.request_timeout_ms = timeout;
    }
    config
        .sync
        .validate()
        .map_err(|error| CliError::Config(error.to_string()))?;
    Ok(config)
}

pub fn effective_config(ctx: &CommandContext) -> EffectiveConfig {
    EffectiveConfig {
        config_path: default_config_path()
            .ok()
            .map(|path| path.display().to_string()),
        api_base_url: ctx.config.api_base_url(),
        api_token: ctx.config.api_token().map(|_| "[REDACTED]"),
        db_path: ctx.db_path.display().to_string(),
        sync: ctx.settings.clone(),
    }
}

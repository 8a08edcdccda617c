use std::path::PathBuf;
use std::sync::Arc;

use coldsync_core::sync::{CompletionRegistry, DriverParts};
use coldsync_core::{
    CachedEntity, ConflictLog, ConflictRecord, Connectivity, ConnectivityMonitor, HttpRemoteApi,
    LocalCache, NewOperation, OfflineSyncService, OperationKind, QueuedOperation, Store,
    StoreLocation, SyncDriver, SyncQueue, SyncSettings,
};
use serde_json::Value;

use crate::cli::{KindArg, OperationArgs};
use crate::config::CliConfig;
use crate::error::CliError;

const PAYLOAD_PREVIEW_CHARS: usize = 60;

/// Resolved configuration shared by every command
pub struct CommandContext {
    pub config: CliConfig,
    pub db_path: PathBuf,
    pub settings: SyncSettings,
}

impl CommandContext {
    pub fn resolve(config: CliConfig, cli_db_path: Option<PathBuf>) -> Result<Self, CliError> {
        let db_path = config.resolve_db_path(cli_db_path);
        let settings = config.sync_settings().map_err(CliError::Config)?;
        Ok(Self {
            config,
            db_path,
            settings,
        })
    }

    pub fn open_store(&self) -> Result<Store, CliError> {
        Ok(Store::open(&self.db_path)?)
    }

    pub fn open_queue(&self) -> Result<SyncQueue, CliError> {
        Ok(SyncQueue::new(self.open_store()?, &self.settings))
    }

    pub fn open_cache(&self) -> Result<LocalCache, CliError> {
        Ok(LocalCache::new(self.open_store()?))
    }

    pub fn open_conflicts(&self) -> Result<ConflictLog, CliError> {
        Ok(ConflictLog::new(self.open_store()?))
    }

    pub fn build_api(&self) -> Result<HttpRemoteApi, CliError> {
        let base_url = self
            .config
            .api_base_url()
            .ok_or(CliError::ApiNotConfigured)?;
        Ok(HttpRemoteApi::new(base_url, self.config.api_token())?)
    }

    /// Driver without timer or listener, for one-off passes
    pub fn build_driver(
        &self,
        api: HttpRemoteApi,
        online: bool,
    ) -> Result<SyncDriver<HttpRemoteApi>, CliError> {
        let store = self.open_store()?;
        Ok(SyncDriver::new(DriverParts {
            api: Arc::new(api),
            queue: SyncQueue::new(store.clone(), &self.settings),
            conflicts: ConflictLog::new(store),
            connectivity: ConnectivityMonitor::new(Connectivity::from_online(online)),
            completions: CompletionRegistry::new(),
            request_timeout: self.settings.request_timeout(),
            sync_interval: self.settings.sync_interval(),
        }))
    }

    pub fn build_service(
        &self,
        api: HttpRemoteApi,
        settings: SyncSettings,
        connectivity: ConnectivityMonitor,
    ) -> Result<OfflineSyncService<HttpRemoteApi>, CliError> {
        Ok(OfflineSyncService::with_connectivity(
            api,
            StoreLocation::Path(self.db_path.clone()),
            settings,
            connectivity,
        )?)
    }
}

pub fn parse_json_arg(field: &'static str, raw: &str) -> Result<Value, CliError> {
    serde_json::from_str(raw).map_err(|error| CliError::InvalidJson {
        field,
        message: error.to_string(),
    })
}

pub const fn operation_kind(kind: KindArg) -> OperationKind {
    match kind {
        KindArg::Create => OperationKind::Create,
        KindArg::Update => OperationKind::Update,
        KindArg::Delete => OperationKind::Delete,
    }
}

pub fn build_operation(args: &OperationArgs) -> Result<NewOperation, CliError> {
    let payload = args
        .data
        .as_deref()
        .map(|raw| parse_json_arg("--data", raw))
        .transpose()?
        .unwrap_or(Value::Null);

    let mut operation = match operation_kind(args.kind) {
        OperationKind::Create => NewOperation::create(args.endpoint.trim(), payload),
        OperationKind::Update => NewOperation::update(args.endpoint.trim(), payload),
        OperationKind::Delete => NewOperation {
            payload,
            ..NewOperation::delete(args.endpoint.trim())
        },
    };
    if let Some(method) = args.method.as_deref() {
        operation = operation.with_method(method);
    }
    if let Some(predecessor) = args.after {
        operation = operation.after(predecessor);
    }
    Ok(operation)
}

pub fn format_operation_lines(operations: &[QueuedOperation], now_ms: i64) -> Vec<String> {
    operations
        .iter()
        .map(|operation| {
            let mut line = format!(
                "#{:<5} {:<9} {:<6} {:<6} {}  retries={}/{}  {}",
                operation.id,
                operation.status,
                operation.kind,
                operation.method,
                operation.endpoint,
                operation.retries,
                operation.max_retries,
                format_relative_time(operation.created_at, now_ms)
            );
            if let Some(predecessor) = operation.depends_on {
                line.push_str(&format!("  after=#{predecessor}"));
            }
            if let Some(error) = &operation.last_error {
                line.push_str(&format!("  error={error}"));
            }
            line
        })
        .collect()
}

pub fn format_cache_lines(entries: &[CachedEntity], now_ms: i64) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            format!(
                "{:<24} {:<12} {}  {}",
                entry.key,
                entry.entity_type,
                format_relative_time(entry.updated_at, now_ms),
                json_preview(&entry.data, PAYLOAD_PREVIEW_CHARS)
            )
        })
        .collect()
}

pub fn format_conflict_lines(conflicts: &[ConflictRecord]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            let endpoint = conflict
                .operation
                .get("endpoint")
                .and_then(Value::as_str)
                .unwrap_or("?");
            let status = conflict.resolution.map_or_else(
                || "unresolved".to_string(),
                |resolution| format!("resolved:{resolution}"),
            );
            format!(
                "#{:<5} {}  {:<16} {}  local={}  server={}",
                conflict.id,
                format_timestamp(conflict.detected_at),
                status,
                endpoint,
                json_preview(&conflict.local_data, PAYLOAD_PREVIEW_CHARS),
                json_preview(&conflict.server_data, PAYLOAD_PREVIEW_CHARS)
            )
        })
        .collect()
}

pub fn json_preview(value: &Value, max_chars: usize) -> String {
    let rendered = value.to_string();
    if rendered.chars().count() <= max_chars {
        return rendered;
    }
    let truncated = rendered.chars().take(max_chars).collect::<String>();
    format!("{truncated}...")
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else {
        format!("{}d ago", diff / day)
    }
}

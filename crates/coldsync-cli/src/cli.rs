use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "coldsync")]
#[command(about = "Offline-first sync queue for the cold-chain dashboard")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue an operation for the next sync pass
    Enqueue(OperationArgs),
    /// Run an operation now, queueing it when the API is unreachable
    Exec(OperationArgs),
    /// Inspect and maintain the sync queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
    /// Run one drain pass against the API
    Sync,
    /// Keep draining in the background until interrupted
    Run {
        /// Seconds between drain passes (defaults to the configured interval)
        #[arg(long, value_name = "SECS")]
        interval_secs: Option<u64>,
        /// Seconds between reachability probes
        #[arg(long, value_name = "SECS", default_value = "15")]
        probe_secs: u64,
    },
    /// Read and write the local entity cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    /// Review and resolve sync conflicts
    Conflicts {
        #[command(subcommand)]
        command: ConflictCommands,
    },
    /// Configure API access and sync settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Clone, Debug)]
pub struct OperationArgs {
    /// Operation kind
    #[arg(long, value_enum)]
    pub kind: KindArg,
    /// API endpoint, relative to the configured base URL
    #[arg(long, value_name = "PATH")]
    pub endpoint: String,
    /// HTTP method (defaults by kind: create=POST, update=PUT, delete=DELETE)
    #[arg(long, value_name = "METHOD")]
    pub method: Option<String>,
    /// JSON payload
    #[arg(long, value_name = "JSON")]
    pub data: Option<String>,
    /// Only replay after this queued operation has completed
    #[arg(long, value_name = "ID")]
    pub after: Option<i64>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum KindArg {
    Create,
    Update,
    Delete,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StatusArg {
    Pending,
    Completed,
    Failed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StrategyArg {
    Local,
    Server,
    Merge,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum QueueCommands {
    /// List queued operations, newest first
    List {
        /// Only show operations with this status
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        /// Number of operations to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show queue depth by status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove completed operations past the retention window
    Cleanup,
    /// Queue a fresh copy of a failed operation
    Requeue {
        /// Failed operation id
        id: i64,
    },
}

#[derive(Subcommand)]
pub enum CacheCommands {
    /// Store an entity under a key
    Put {
        key: String,
        /// Entity type tag
        #[arg(long = "type", value_name = "TYPE")]
        entity_type: String,
        /// JSON data
        #[arg(long, value_name = "JSON")]
        data: String,
    },
    /// Print the cached data for a key
    Get { key: String },
    /// Remove a cached entry
    Delete { key: String },
    /// List cached entries
    List {
        /// Only show entries of this type
        #[arg(long = "type", value_name = "TYPE")]
        entity_type: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConflictCommands {
    /// List conflicts (unresolved only unless --all)
    List {
        /// Include resolved conflicts
        #[arg(long)]
        all: bool,
        /// Number of conflicts to show with --all
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record the decision taken on a conflict
    Resolve {
        id: i64,
        #[arg(long, value_enum)]
        strategy: StrategyArg,
        /// Resolved JSON data (required for merge)
        #[arg(long, value_name = "JSON")]
        data: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update the CLI config file (a global --db-path is saved as the default)
    Init {
        /// API base URL
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Bearer token for the API
        #[arg(long, value_name = "TOKEN")]
        api_token: Option<String>,
        /// Milliseconds between background drain passes
        #[arg(long, value_name = "MS")]
        sync_interval_ms: Option<u64>,
        /// Per-request timeout in milliseconds
        #[arg(long, value_name = "MS")]
        request_timeout_ms: Option<u64>,
    },
    /// Print the effective configuration
    Show,
}

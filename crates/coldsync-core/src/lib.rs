//! coldsync-core - offline-first synchronization for the cold-chain dashboard
//!
//! Mutating calls go through [`OfflineSyncService`]: executed directly while
//! the backend is reachable, otherwise persisted in a durable queue and
//! replayed in order by a background [`SyncDriver`] once connectivity
//! returns. A key-addressed cache keeps last-known-good entities for reads
//! during outages, and server-signalled version conflicts land in a log for
//! later resolution.

pub mod api;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

#[cfg(test)]
mod testing;

pub use api::{ApiError, ApiRequest, ApiResponse, HttpRemoteApi, RemoteApi};
pub use config::{RetryPolicy, SyncSettings};
pub use connectivity::{spawn_probe, Connectivity, ConnectivityMonitor};
pub use db::{ConflictLog, LocalCache, QueueCounts, Store, SyncQueue};
pub use error::{Error, Result};
pub use models::{
    CachedEntity, ConflictRecord, NewOperation, OperationKind, OperationStatus, QueuedOperation,
    ResolutionStrategy,
};
pub use services::{Execution, OfflineSyncService, QueueStatus, StoreLocation};
pub use state::SyncState;
pub use sync::{PendingOperation, SyncDriver, SyncReport};

//! Durable store connection management

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::{Mutex, MutexGuard};

use super::migrations;
use crate::error::{Error, Result};

/// Handle to the local `SQLite` store backing the queue, cache and conflict log
///
/// Cloning is cheap; all clones share one connection. Every access goes
/// through an async mutex, so a read-then-write inside one lock is atomic
/// with respect to other callers.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open the store at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|error| {
                Error::StorageUnavailable(format!(
                    "cannot create store directory {}: {error}",
                    parent.display()
                ))
            })?;
        }

        let conn = Connection::open(&path).map_err(|error| {
            Error::StorageUnavailable(format!("cannot open {}: {error}", path.display()))
        })?;
        Self::initialize(conn, Some(path))
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|error| Error::StorageUnavailable(error.to_string()))?;
        Self::initialize(conn, None)
    }

    fn initialize(mut conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        configure(&conn, path.is_some())?;
        migrations::run(&mut conn)?;
        tracing::debug!(
            "Opened store at {}",
            path.as_deref()
                .map_or_else(|| ":memory:".to_string(), |path| path.display().to_string())
        );
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Location of the database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Exclusive access to the underlying connection
    pub(crate) async fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().await
    }
}

/// Configure `SQLite` for a single-writer local store
fn configure(conn: &Connection, on_disk: bool) -> Result<()> {
    if on_disk {
        // WAL is unavailable for in-memory databases
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!("Store journal mode: {mode}");
        conn.pragma_update(None, "synchronous", "NORMAL")?;
    }
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}

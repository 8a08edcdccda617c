//! Store migrations

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension};

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0)
        })
        .optional()?
        .flatten()
        .unwrap_or(0);

    Ok(version)
}

/// Migration to version 1: queue, cache and conflict collections
fn migrate_v1(conn: &mut Connection) -> Result<()> {
    let tx = conn.transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS sync_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            endpoint TEXT NOT NULL,
            method TEXT NOT NULL DEFAULT 'POST',
            payload TEXT NOT NULL,
            idempotency_key TEXT NOT NULL,
            depends_on INTEGER,
            created_at INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            retries INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 3,
            last_error TEXT,
            last_attempt INTEGER,
            completed_at INTEGER,
            next_attempt_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_sync_queue_status ON sync_queue(status, id);
        CREATE INDEX IF NOT EXISTS idx_sync_queue_completed ON sync_queue(completed_at);

        CREATE TABLE IF NOT EXISTS cached_entities (
            key TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_cached_entities_type ON cached_entities(entity_type);

        CREATE TABLE IF NOT EXISTS sync_conflicts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            local_data TEXT NOT NULL,
            server_data TEXT NOT NULL,
            operation TEXT NOT NULL,
            detected_at INTEGER NOT NULL,
            resolved INTEGER NOT NULL DEFAULT 0,
            resolution TEXT,
            resolved_data TEXT,
            resolved_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_sync_conflicts_resolved ON sync_conflicts(resolved, id);

        INSERT INTO schema_version (version) VALUES (1);",
    )?;

    tx.commit()?;
    tracing::info!("Migrated store to version {CURRENT_VERSION}");
    Ok(())
}

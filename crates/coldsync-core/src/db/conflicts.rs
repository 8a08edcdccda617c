//! Conflict log

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;

use super::{parse_json_column, parse_optional_json_column, Store};
use crate::error::Result;
use crate::models::{ConflictRecord, ResolutionStrategy};
use crate::util::unix_millis_now;

const COLUMNS: &str = "id, local_data, server_data, operation, detected_at, resolved, \
     resolution, resolved_data, resolved_at";

/// Records detected divergences and the decisions taken on them
///
/// Resolution policy lives with the caller; this log only stores it.
#[derive(Clone)]
pub struct ConflictLog {
    store: Store,
}

impl ConflictLog {
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Store a new unresolved conflict and return its id
    pub async fn record_conflict(
        &self,
        local_data: &Value,
        server_data: &Value,
        operation: &Value,
    ) -> Result<i64> {
        let conn = self.store.lock().await;
        conn.execute(
            "INSERT INTO sync_conflicts (local_data, server_data, operation, detected_at, resolved)
             VALUES (?, ?, ?, ?, 0)",
            params![
                serde_json::to_string(local_data)?,
                serde_json::to_string(server_data)?,
                serde_json::to_string(operation)?,
                unix_millis_now()
            ],
        )?;
        let id = conn.last_insert_rowid();
        tracing::warn!("Recorded sync conflict #{id}");
        Ok(id)
    }

    /// Finalize a conflict with the caller's decision
    ///
    /// Unknown ids and already-resolved conflicts are left untouched; the
    /// return value tells whether this call recorded the resolution.
    pub async fn resolve_conflict(
        &self,
        id: i64,
        resolution: ResolutionStrategy,
        resolved_data: Option<&Value>,
    ) -> Result<bool> {
        let resolved_data = resolved_data.map(serde_json::to_string).transpose()?;
        let conn = self.store.lock().await;
        let rows = conn.execute(
            "UPDATE sync_conflicts
             SET resolved = 1, resolution = ?, resolved_data = ?, resolved_at = ?
             WHERE id = ? AND resolved = 0",
            params![resolution.as_str(), resolved_data, unix_millis_now(), id],
        )?;
        if rows > 0 {
            tracing::info!("Resolved sync conflict #{id} with strategy {resolution}");
        }
        Ok(rows > 0)
    }

    /// Unresolved conflicts, oldest first
    pub async fn get_unresolved(&self) -> Result<Vec<ConflictRecord>> {
        let conn = self.store.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM sync_conflicts WHERE resolved = 0 ORDER BY id ASC"
        ))?;
        let conflicts = stmt
            .query_map([], parse_conflict)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(conflicts)
    }

    pub async fn get(&self, id: i64) -> Result<Option<ConflictRecord>> {
        let conn = self.store.lock().await;
        let conflict = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM sync_conflicts WHERE id = ?"),
                [id],
                parse_conflict,
            )
            .optional()?;
        Ok(conflict)
    }

    /// Most recent conflicts, resolved or not
    pub async fn list(&self, limit: usize) -> Result<Vec<ConflictRecord>> {
        let conn = self.store.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM sync_conflicts ORDER BY id DESC LIMIT ?"
        ))?;
        let conflicts = stmt
            .query_map([limit as i64], parse_conflict)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(conflicts)
    }
}

fn parse_conflict(row: &Row<'_>) -> rusqlite::Result<ConflictRecord> {
    let resolution = row
        .get::<_, Option<String>>(6)?
        .map(|raw| {
            raw.parse::<ResolutionStrategy>().map_err(|error| {
                rusqlite::Error::FromSqlConversionFailure(
                    6,
                    rusqlite::types::Type::Text,
                    error.into(),
                )
            })
        })
        .transpose()?;

    Ok(ConflictRecord {
        id: row.get(0)?,
        local_data: parse_json_column(row, 1)?,
        server_data: parse_json_column(row, 2)?,
        operation: parse_json_column(row, 3)?,
        detected_at: row.get(4)?,
        resolved: row.get::<_, i32>(5)? != 0,
        resolution,
        resolved_data: parse_optional_json_column(row, 7)?,
        resolved_at: row.get(8)?,
    })
}

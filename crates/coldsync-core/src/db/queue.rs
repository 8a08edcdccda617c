//! Sync queue: durable log of pending mutations

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use super::{parse_json_column, parse_text_column, Store};
use crate::config::{RetryPolicy, SyncSettings};
use crate::error::{Error, Result};
use crate::models::{NewOperation, OperationStatus, QueuedOperation};
use crate::util::{duration_millis, unix_millis_now};

const COLUMNS: &str = "id, kind, endpoint, method, payload, idempotency_key, depends_on, \
     created_at, status, retries, max_retries, last_error, last_attempt, completed_at, \
     next_attempt_at";

/// Per-status totals for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Queue of operations to replay against the remote API
///
/// The only component that reads or writes the `sync_queue` collection.
#[derive(Clone)]
pub struct SyncQueue {
    store: Store,
    policy: RetryPolicy,
    retention: Duration,
}

impl SyncQueue {
    pub fn new(store: Store, settings: &SyncSettings) -> Self {
        Self {
            store,
            policy: settings.retry_policy(),
            retention: settings.completed_retention(),
        }
    }

    /// Store a new `pending` operation and return it with its assigned id
    pub async fn enqueue(&self, operation: NewOperation) -> Result<QueuedOperation> {
        if operation.endpoint.trim().is_empty() {
            return Err(Error::InvalidInput(
                "operation endpoint cannot be empty".to_string(),
            ));
        }

        let now = unix_millis_now();
        let conn = self.store.lock().await;
        if let Some(predecessor) = operation.depends_on {
            // Predecessors must already exist, so every dependency points backwards
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sync_queue WHERE id = ?)",
                [predecessor],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(Error::InvalidInput(format!(
                    "operation depends on unknown operation #{predecessor}"
                )));
            }
        }
        conn.execute(
            "INSERT INTO sync_queue
                (kind, endpoint, method, payload, idempotency_key, depends_on, created_at,
                 status, retries, max_retries)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', 0, ?)",
            params![
                operation.kind.as_str(),
                operation.endpoint,
                operation.method,
                serde_json::to_string(&operation.payload)?,
                Uuid::now_v7().to_string(),
                operation.depends_on,
                now,
                self.policy.max_retries,
            ],
        )?;
        let id = conn.last_insert_rowid();
        let queued = fetch(&conn, id)?
            .ok_or_else(|| Error::InvalidInput(format!("operation #{id} vanished after insert")))?;

        tracing::debug!(
            "Queued operation #{} {} {}",
            queued.id,
            queued.method,
            queued.endpoint
        );
        Ok(queued)
    }

    /// All `pending` operations, oldest first
    pub async fn get_pending(&self) -> Result<Vec<QueuedOperation>> {
        let conn = self.store.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM sync_queue WHERE status = 'pending' ORDER BY id ASC"
        ))?;
        let operations = stmt
            .query_map([], parse_operation)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(operations)
    }

    /// Fetch one operation by id
    pub async fn get(&self, id: i64) -> Result<Option<QueuedOperation>> {
        let conn = self.store.lock().await;
        fetch(&conn, id)
    }

    /// List operations newest first, optionally filtered by status
    pub async fn list(
        &self,
        status: Option<OperationStatus>,
        limit: usize,
    ) -> Result<Vec<QueuedOperation>> {
        let conn = self.store.lock().await;
        let operations = if let Some(status) = status {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM sync_queue WHERE status = ? ORDER BY id DESC LIMIT ?"
            ))?;
            let rows = stmt.query_map(params![status.as_str(), limit as i64], parse_operation)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        } else {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM sync_queue ORDER BY id DESC LIMIT ?"
            ))?;
            let rows = stmt.query_map(params![limit as i64], parse_operation)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        Ok(operations)
    }

    /// Number of `pending` operations
    pub async fn pending_count(&self) -> Result<usize> {
        let conn = self.store.lock().await;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub async fn counts(&self) -> Result<QueueCounts> {
        let conn = self.store.lock().await;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM sync_queue GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut counts = QueueCounts::default();
        for (status, count) in rows {
            let count = usize::try_from(count).unwrap_or_default();
            match status.parse::<OperationStatus>() {
                Ok(OperationStatus::Pending) => counts.pending = count,
                Ok(OperationStatus::Completed) => counts.completed = count,
                Ok(OperationStatus::Failed) => counts.failed = count,
                Err(error) => tracing::warn!("Ignoring queue rows: {error}"),
            }
        }
        Ok(counts)
    }

    /// Mark a pending operation `completed`
    ///
    /// Returns `false` (not an error) when the id is unknown or already terminal.
    pub async fn mark_completed(&self, id: i64) -> Result<bool> {
        let now = unix_millis_now();
        let conn = self.store.lock().await;
        let rows = conn.execute(
            "UPDATE sync_queue
             SET status = 'completed', completed_at = ?, last_attempt = ?, next_attempt_at = NULL
             WHERE id = ? AND status = 'pending'",
            params![now, now, id],
        )?;
        Ok(rows > 0)
    }

    /// Record a failed replay attempt
    ///
    /// Increments the retry count; once it reaches the ceiling the operation
    /// becomes `failed`, otherwise it stays `pending` until the backoff delay
    /// has elapsed. Returns the updated record, `None` for unknown ids.
    pub async fn mark_failed(&self, id: i64, error: &str) -> Result<Option<QueuedOperation>> {
        let now = unix_millis_now();
        let mut conn = self.store.lock().await;
        let tx = conn.transaction()?;

        let current = tx
            .query_row(
                "SELECT retries, max_retries, status FROM sync_queue WHERE id = ?",
                [id],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((retries, max_retries, status)) = current else {
            return Ok(None);
        };
        if status != OperationStatus::Pending.as_str() {
            return fetch(&tx, id);
        }

        let retries = retries.saturating_add(1);
        if retries >= max_retries {
            tx.execute(
                "UPDATE sync_queue
                 SET status = 'failed', retries = ?, last_error = ?, last_attempt = ?,
                     next_attempt_at = NULL
                 WHERE id = ?",
                params![retries, error, now, id],
            )?;
        } else {
            let next_attempt_at =
                now.saturating_add(duration_millis(self.policy.delay_after(retries)));
            tx.execute(
                "UPDATE sync_queue
                 SET status = 'pending', retries = ?, last_error = ?, last_attempt = ?,
                     next_attempt_at = ?
                 WHERE id = ?",
                params![retries, error, now, next_attempt_at, id],
            )?;
        }

        let updated = fetch(&tx, id)?;
        tx.commit()?;
        Ok(updated)
    }

    /// Terminally fail a pending operation without a replay attempt
    ///
    /// The retry count is left untouched.
    pub async fn mark_abandoned(&self, id: i64, error: &str) -> Result<bool> {
        let now = unix_millis_now();
        let conn = self.store.lock().await;
        let rows = conn.execute(
            "UPDATE sync_queue
             SET status = 'failed', last_error = ?, last_attempt = ?, next_attempt_at = NULL
             WHERE id = ? AND status = 'pending'",
            params![error, now, id],
        )?;
        Ok(rows > 0)
    }

    /// Enqueue a fresh copy of a `failed` operation
    pub async fn requeue_failed(&self, id: i64) -> Result<Option<QueuedOperation>> {
        let Some(existing) = self.get(id).await? else {
            return Ok(None);
        };
        if existing.status != OperationStatus::Failed {
            return Err(Error::InvalidInput(format!(
                "operation #{id} is {}, only failed operations can be requeued",
                existing.status
            )));
        }

        let queued = self.enqueue(existing.to_new_operation()).await?;
        tracing::info!("Requeued failed operation #{id} as #{}", queued.id);
        Ok(Some(queued))
    }

    /// Delete completed operations older than the retention window
    pub async fn cleanup_completed(&self) -> Result<usize> {
        self.cleanup_completed_at(unix_millis_now()).await
    }

    /// Same as [`Self::cleanup_completed`], measured from `now_ms`
    pub async fn cleanup_completed_at(&self, now_ms: i64) -> Result<usize> {
        let cutoff = now_ms.saturating_sub(duration_millis(self.retention));
        let conn = self.store.lock().await;
        let removed = conn.execute(
            "DELETE FROM sync_queue WHERE status = 'completed' AND completed_at < ?",
            [cutoff],
        )?;
        if removed > 0 {
            tracing::info!("Cleaned up {removed} completed operations");
        }
        Ok(removed)
    }
}

fn fetch(conn: &Connection, id: i64) -> Result<Option<QueuedOperation>> {
    let operation = conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM sync_queue WHERE id = ?"),
            [id],
            parse_operation,
        )
        .optional()?;
    Ok(operation)
}

fn parse_operation(row: &Row<'_>) -> rusqlite::Result<QueuedOperation> {
    Ok(QueuedOperation {
        id: row.get(0)?,
        kind: parse_text_column(row, 1)?,
        endpoint: row.get(2)?,
        method: row.get(3)?,
        payload: parse_json_column(row, 4)?,
        idempotency_key: row.get(5)?,
        depends_on: row.get(6)?,
        created_at: row.get(7)?,
        status: parse_text_column(row, 8)?,
        retries: row.get(9)?,
        max_retries: row.get(10)?,
        last_error: row.get(11)?,
        last_attempt: row.get(12)?,
        completed_at: row.get(13)?,
        next_attempt_at: row.get(14)?,
    })
}

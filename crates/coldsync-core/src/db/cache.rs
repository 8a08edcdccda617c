//! Local data cache of last-known-good entities

use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;

use super::{parse_json_column, Store};
use crate::error::{Error, Result};
use crate::models::CachedEntity;
use crate::util::unix_millis_now;

/// Key-addressed cache of entities last known to match the server
///
/// Reads may be stale; callers inspect `updated_at` through
/// [`LocalCache::get_entry`] when freshness matters.
#[derive(Clone)]
pub struct LocalCache {
    store: Store,
}

impl LocalCache {
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Insert or overwrite the entry stored under `key`
    pub async fn save(&self, key: &str, data: &Value, entity_type: &str) -> Result<CachedEntity> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::InvalidInput("cache key cannot be empty".to_string()));
        }

        let entity = CachedEntity {
            key: key.to_string(),
            data: data.clone(),
            entity_type: entity_type.trim().to_string(),
            updated_at: unix_millis_now(),
        };

        let conn = self.store.lock().await;
        conn.execute(
            "INSERT INTO cached_entities (key, data, entity_type, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                data = excluded.data,
                entity_type = excluded.entity_type,
                updated_at = excluded.updated_at",
            params![
                entity.key,
                serde_json::to_string(&entity.data)?,
                entity.entity_type,
                entity.updated_at
            ],
        )?;
        Ok(entity)
    }

    /// Cached data for `key`, if any
    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.get_entry(key).await?.map(|entity| entity.data))
    }

    /// Full cache record for `key`, including its `updated_at`
    pub async fn get_entry(&self, key: &str) -> Result<Option<CachedEntity>> {
        let conn = self.store.lock().await;
        let entity = conn
            .query_row(
                "SELECT key, data, entity_type, updated_at FROM cached_entities WHERE key = ?",
                [key.trim()],
                parse_entity,
            )
            .optional()?;
        Ok(entity)
    }

    /// Remove the entry for `key`; returns whether one existed
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.store.lock().await;
        let rows = conn.execute("DELETE FROM cached_entities WHERE key = ?", [key.trim()])?;
        Ok(rows > 0)
    }

    /// Data of every entry tagged with `entity_type`
    pub async fn get_all_by_type(&self, entity_type: &str) -> Result<Vec<Value>> {
        Ok(self
            .list_entries(Some(entity_type))
            .await?
            .into_iter()
            .map(|entity| entity.data)
            .collect())
    }

    /// Entries ordered by key, optionally restricted to one type
    pub async fn list_entries(&self, entity_type: Option<&str>) -> Result<Vec<CachedEntity>> {
        let conn = self.store.lock().await;
        let entries = if let Some(entity_type) = entity_type {
            let mut stmt = conn.prepare(
                "SELECT key, data, entity_type, updated_at
                 FROM cached_entities
                 WHERE entity_type = ?
                 ORDER BY key ASC",
            )?;
            let rows = stmt.query_map([entity_type.trim()], parse_entity)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        } else {
            let mut stmt = conn.prepare(
                "SELECT key, data, entity_type, updated_at FROM cached_entities ORDER BY key ASC",
            )?;
            let rows = stmt.query_map([], parse_entity)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        Ok(entries)
    }
}

fn parse_entity(row: &Row<'_>) -> rusqlite::Result<CachedEntity> {
    Ok(CachedEntity {
        key: row.get(0)?,
        data: parse_json_column(row, 1)?,
        entity_type: row.get(2)?,
        updated_at: row.get(3)?,
    })
}

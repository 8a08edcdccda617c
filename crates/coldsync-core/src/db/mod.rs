//! Durable store and the three collections built on it

mod cache;
mod conflicts;
mod connection;
mod migrations;
mod queue;

pub use cache::LocalCache;
pub use conflicts::ConflictLog;
pub use connection::Store;
pub use queue::{QueueCounts, SyncQueue};

use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::Row;
use serde_json::Value;

/// Decode a TEXT column holding serialized JSON
fn parse_json_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Value> {
    let raw: String = row.get(index)?;
    serde_json::from_str(&raw)
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, error.into()))
}

fn parse_optional_json_column(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<Value>> {
    let raw: Option<String> = row.get(index)?;
    raw.map(|raw| {
        serde_json::from_str(&raw).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(index, Type::Text, error.into())
        })
    })
    .transpose()
}

/// Decode a TEXT column holding an enum label
fn parse_text_column<T>(row: &Row<'_>, index: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(index)?;
    raw.parse().map_err(|error: String| {
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, error.into())
    })
}

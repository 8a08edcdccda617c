//! Data models for coldsync

mod cached_entity;
mod conflict;
mod operation;

pub use cached_entity::CachedEntity;
pub use conflict::{ConflictRecord, ResolutionStrategy};
pub use operation::{
    NewOperation, OperationKind, OperationStatus, QueuedOperation, DEFAULT_METHOD, MAX_RETRIES,
};

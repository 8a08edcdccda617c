pub mod cache;
pub mod common;
pub mod completions;
pub mod config;
pub mod conflicts;
pub mod operation;
pub mod queue;
pub mod sync;

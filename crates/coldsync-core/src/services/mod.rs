//! Services composed from the store, the queue and the driver.

mod offline_sync;

pub use offline_sync::{Execution, OfflineSyncService, QueueStatus, StoreLocation};

//! Queue draining and completion tracking.

mod completion;
mod driver;

pub use completion::{CompletionRegistry, PendingOperation};
pub use driver::{DriverParts, SyncDriver, SyncReport};

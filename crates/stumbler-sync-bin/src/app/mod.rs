//! Command implementations.

mod queue;
mod sync;

pub use queue::{enqueue_file, queue_summary};
pub use sync::{run_sync, NetworkKind};

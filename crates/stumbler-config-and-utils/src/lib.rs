//! Configuration, paths, and logging setup for stumbler-sync.

mod config;
mod error;
mod lock;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_API_KEY, DEFAULT_BATCH_SIZE, DEFAULT_ENDPOINT_URL, DEFAULT_LOG_LEVEL,
    DEFAULT_MAX_RETRY_COUNT, DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use lock::RunLock;
pub use logging::init_logging;
pub use paths::Paths;

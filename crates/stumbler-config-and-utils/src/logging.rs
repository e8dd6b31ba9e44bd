//! Logging initialization.
//!
//! Thin wrapper over the observability crate: every run writes structured
//! JSONL to `<base_dir>/logs/sync.jsonl` and mirrors events to stderr.

use crate::Paths;
use observability::{LogConfig, StderrFormat};

/// Initialize the logging system.
///
/// * `level` - Default log level, used when `RUST_LOG` is not set
/// * `paths` - Determines the JSONL log file location
///
/// `STUMBLER_LOG_FORMAT=json` switches stderr output to JSON lines.
pub fn init_logging(level: &str, paths: &Paths) {
    let stderr_format = stderr_format(std::env::var("STUMBLER_LOG_FORMAT").ok().as_deref());

    observability::init_with_config(LogConfig {
        service_name: "stumbler-sync".into(),
        default_level: level.into(),
        log_path: Some(paths.log_file()),
        file_output: true,
        also_stderr: true,
        stderr_format,
    });
}

/// Unset or unrecognised values fall back to compact output.
fn stderr_format(raw: Option<&str>) -> StderrFormat {
    raw.and_then(|raw| raw.parse().ok()).unwrap_or_default()
}

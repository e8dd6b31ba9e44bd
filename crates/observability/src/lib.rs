//! # Observability
//!
//! Logging setup for stumbler-sync.
//!
//! Components are log producers only: they use the standard `tracing` macros
//! with structured fields and never know where output goes. The binary calls
//! [`init_with_config`] once at startup, which installs:
//!
//! - a JSON layer writing JSONL to a log file (`~/.stumbler/logs/sync.jsonl`
//!   unless overridden), so a run can be inspected with `tail -f | jq`
//! - an optional stderr layer, compact or JSON
//!
//! Both layers are filtered by `RUST_LOG` when set, else by the configured
//! default level.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "stumbler-sync".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! ```

mod file;

pub use file::{default_log_path, LogFileWriter, WriterFactory};

use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Output format for the stderr layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StderrFormat {
    /// Human-readable single-line output.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

impl std::str::FromStr for StderrFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown stderr format: {}", other)),
        }
    }
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, logged once at startup.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path. `None` uses [`default_log_path`].
    pub log_path: Option<PathBuf>,

    /// Write JSONL to the log file.
    pub file_output: bool,

    /// Also emit logs to stderr.
    pub also_stderr: bool,

    /// Format of the stderr output.
    pub stderr_format: StderrFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            file_output: true,
            also_stderr: false,
            stderr_format: StderrFormat::Compact,
        }
    }
}

/// Initialize logging with custom configuration.
///
/// If the log file cannot be opened, logging continues on stderr only and the
/// failure is reported as the first warning. Calling this more than once is a
/// no-op after the first successful install.
pub fn init_with_config(config: LogConfig) {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut file_error = None;

    let log_path = if config.file_output {
        config.log_path.clone().or_else(default_log_path)
    } else {
        None
    };

    if let Some(path) = &log_path {
        match LogFileWriter::new(path) {
            Ok(writer) => layers.push(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_writer(WriterFactory::new(writer))
                    .with_filter(env_filter(&config.default_level))
                    .boxed(),
            ),
            Err(e) => file_error = Some(e),
        }
    }

    // Without a usable file there must still be somewhere to log.
    let stderr_enabled = config.also_stderr || layers.is_empty();
    if stderr_enabled {
        let layer = match config.stderr_format {
            StderrFormat::Compact => tracing_subscriber::fmt::layer()
                .with_target(true)
                .compact()
                .with_writer(std::io::stderr)
                .with_filter(env_filter(&config.default_level))
                .boxed(),
            StderrFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(env_filter(&config.default_level))
                .boxed(),
        };
        layers.push(layer);
    }

    if tracing_subscriber::registry().with(layers).try_init().is_err() {
        return;
    }

    match (&log_path, file_error) {
        (Some(path), Some(e)) => tracing::warn!(
            log_path = %path.display(),
            error = %e,
            "could not open log file, logging to stderr only"
        ),
        (Some(path), None) => tracing::info!(
            service = %config.service_name,
            log_path = %path.display(),
            "observability initialized"
        ),
        (None, _) => tracing::info!(service = %config.service_name, "observability initialized"),
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default submission endpoint.
pub const DEFAULT_ENDPOINT_URL: &str = "https://location.services.mozilla.com/v1/submit";

/// Default API key (can be baked in at compile time via STUMBLER_API_KEY env var).
pub const DEFAULT_API_KEY: Option<&str> = option_env!("STUMBLER_API_KEY");

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default number of reports per upload batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Default number of transient failures before a report is discarded.
pub const DEFAULT_MAX_RETRY_COUNT: i64 = 3;

/// Default HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Submission endpoint URL (without the `key` query parameter).
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: String,
    /// API key appended as `?key=` to the endpoint.
    #[serde(default = "default_api_key")]
    pub api_key: Option<String>,
    /// Optional nickname sent with every upload.
    #[serde(default)]
    pub nickname: Option<String>,
    /// Only upload on unmetered networks unless forced.
    #[serde(default = "default_true")]
    pub wifi_only: bool,
    /// Maximum reports per upload batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Transient failures tolerated per report before it is discarded.
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: i64,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Gzip request bodies (with an uncompressed fallback on 400).
    #[serde(default = "default_true")]
    pub use_compression: bool,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_endpoint_url() -> String {
    DEFAULT_ENDPOINT_URL.to_string()
}

fn default_api_key() -> Option<String> {
    DEFAULT_API_KEY.map(|s| s.to_string())
}

fn default_true() -> bool {
    true
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_retry_count() -> i64 {
    DEFAULT_MAX_RETRY_COUNT
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            endpoint_url: default_endpoint_url(),
            api_key: default_api_key(),
            nickname: None,
            wifi_only: true,
            batch_size: DEFAULT_BATCH_SIZE,
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            use_compression: true,
        }
    }
}

impl Config {
    /// Load configuration from the config file, falling back to defaults.
    ///
    /// Environment variables are applied on top of the file and the result
    /// is validated.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    fn load_from_env(&mut self) {
        self.apply_env(|name| std::env::var(name).ok());
    }

    /// Override fields from `STUMBLER_*` variables. Empty values are ignored.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |name: &str| lookup(name).and_then(non_empty);

        if let Some(level) = var("STUMBLER_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = var("STUMBLER_ENDPOINT_URL") {
            self.endpoint_url = url;
        }
        if let Some(key) = var("STUMBLER_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(nickname) = var("STUMBLER_NICKNAME") {
            self.nickname = Some(nickname);
        }
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> CoreResult<()> {
        if self.batch_size == 0 {
            return Err(CoreError::Config("batch_size must be at least 1".to_string()));
        }
        if self.max_retry_count < 1 {
            return Err(CoreError::Config(
                "max_retry_count must be at least 1".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(CoreError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        self.endpoint_url()?;
        Ok(())
    }

    /// Get the endpoint as a parsed URL.
    pub fn endpoint_url(&self) -> CoreResult<Url> {
        Url::parse(&self.endpoint_url).map_err(CoreError::from)
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

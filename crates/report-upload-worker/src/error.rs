//! Upload worker error types.
//!
//! These cover construction and local I/O. Delivery results are not errors:
//! they are classified as [`SubmitOutcome`](crate::SubmitOutcome) values and
//! folded into the [`RunReport`](crate::RunReport).

use thiserror::Error;

/// Upload worker error type.
#[derive(Error, Debug)]
pub enum UploadError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid transport or uploader configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Gzip compression failed
    #[error("Compression error: {0}")]
    Compression(std::io::Error),
}

/// Result type alias using UploadError.
pub type UploadResult<T> = Result<T, UploadError>;

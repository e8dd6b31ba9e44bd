//! # Report Upload Worker
//!
//! Drains the local report queue to the submission service in bounded,
//! id-ordered windows.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌────────────────┐     ┌───────────────┐
//! │  reports table  │────▶│ ReportUploader │────▶│  /v1/submit   │
//! │    (SQLite)     │     │   (windows)    │     │ (gzip + JSON) │
//! └─────────────────┘     └───────┬────────┘     └───────────────┘
//!                                 │
//!                   ┌─────────────┼─────────────┐
//!                   ▼             ▼             ▼
//!             ┌──────────┐  ┌───────────┐  ┌────────────┐
//!             │ encoder  │  │RetryLedger│  │ sync_stats │
//!             └──────────┘  └───────────┘  └────────────┘
//! ```
//!
//! ## Key Features
//!
//! - **Snapshot bound**: a run reads the highest id once and never looks
//!   past it, so rows queued during the run wait for the next one.
//!
//! - **Compression with fallback**: windows are gzipped; a 400 on a
//!   compressed body triggers exactly one uncompressed resend.
//!
//! - **Bounded retries**: transient failures bump a per-row counter and
//!   rows are discarded once it reaches the ceiling (default 3). Permanent
//!   rejections drop the window at once.
//!
//! - **Observable loss**: every row removed without acceptance shows up in
//!   [`RunReport::dropped`]. Windows with nothing encodable are never
//!   deleted; they stay queued and are listed in [`RunReport::unencodable`].
//!
//! ## Example
//!
//! ```ignore
//! use report_upload_worker::{HttpTransport, ReportUploader, SyncGate, TransportConfig, UploaderConfig};
//!
//! let transport = HttpTransport::new(TransportConfig::new(endpoint))?;
//! let uploader = ReportUploader::new(UploaderConfig::default(), &db, transport);
//! let report = uploader.run(SyncGate { network_acceptable: true, force: false }).await;
//! ```

mod encoder;
mod error;
mod ledger;
mod stats;
mod store;
mod transport;
mod uploader;

pub use encoder::{encode_batch, Batch, EncodeError};
pub use error::{UploadError, UploadResult};
pub use ledger::{FailureClass, LedgerOutcome, RetryLedger};
pub use stats::{merge_stats, CumulativeStats, StatsDelta};
pub use store::ReportStore;
pub use transport::{
    gzip, HttpTransport, ReportSubmitter, SubmitOutcome, TransportConfig, NICKNAME_HEADER,
};
pub use uploader::{
    DropReason, DroppedWindow, ReportUploader, RunReport, SkipReason, SyncGate, UnencodableWindow,
    UploaderConfig,
};

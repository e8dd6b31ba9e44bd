//! HTTP submission of encoded windows.

use crate::{UploadError, UploadResult};
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::{Compression, Crc};
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Header carrying the optional contributor nickname.
pub const NICKNAME_HEADER: &str = "X-Nickname";

/// Transport configuration.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Submission endpoint, without the `key` query parameter.
    pub endpoint: Url,
    /// API key appended as `?key=`.
    pub api_key: Option<String>,
    /// Sent as `X-Nickname` when present.
    pub nickname: Option<String>,
    pub user_agent: String,
    /// Whole-request timeout.
    pub timeout: Duration,
}

impl TransportConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            api_key: None,
            nickname: None,
            user_agent: format!("stumbler-sync/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(30),
        }
    }

    /// Endpoint with the API key attached.
    pub fn submit_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("key", key);
        }
        url
    }
}

/// Classified result of one submission attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// 2xx: the service owns the data now.
    Accepted { status: u16 },
    /// 400: the service could not read the body.
    RejectedMalformed,
    /// Any other non-2xx, non-5xx status. Resending will not help.
    RejectedPermanent { status: u16 },
    /// 5xx: the service may accept the same body later.
    RejectedTransient { status: u16 },
    /// No usable response: DNS, connect, TLS, timeout or a broken body.
    TransportError { message: String },
}

impl SubmitOutcome {
    /// Classify an HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Accepted { status },
            400 => Self::RejectedMalformed,
            500..=599 => Self::RejectedTransient { status },
            _ => Self::RejectedPermanent { status },
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// HTTP status behind this outcome, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Accepted { status }
            | Self::RejectedPermanent { status }
            | Self::RejectedTransient { status } => Some(*status),
            Self::RejectedMalformed => Some(400),
            Self::TransportError { .. } => None,
        }
    }
}

/// Something that can deliver an encoded window.
#[async_trait]
pub trait ReportSubmitter: Send + Sync {
    /// Deliver `body` once. Never retries and never fails: every result is an
    /// outcome.
    async fn submit(&self, body: &[u8], compress: bool) -> SubmitOutcome;
}

#[async_trait]
impl<T: ReportSubmitter + ?Sized> ReportSubmitter for &T {
    async fn submit(&self, body: &[u8], compress: bool) -> SubmitOutcome {
        (**self).submit(body, compress).await
    }
}

/// reqwest-backed submitter.
pub struct HttpTransport {
    client: Client,
    url: Url,
    config: TransportConfig,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> UploadResult<Self> {
        if !matches!(config.endpoint.scheme(), "http" | "https") {
            return Err(UploadError::Config(format!(
                "unsupported endpoint scheme: {}",
                config.endpoint.scheme()
            )));
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            url: config.submit_url(),
            config,
        })
    }

    async fn send(&self, payload: Vec<u8>, compressed: bool) -> Result<StatusCode, reqwest::Error> {
        // A Vec body has a known length, so reqwest sets Content-Length to
        // exactly the bytes sent.
        let mut request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, &self.config.user_agent);

        if compressed {
            request = request.header(CONTENT_ENCODING, "gzip");
        }
        if let Some(nickname) = &self.config.nickname {
            request = request.header(NICKNAME_HEADER, nickname);
        }

        let response = request.body(payload).send().await?;
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            return Ok(status);
        }

        // The body is informational only.
        match response.text().await {
            Ok(body) if !body.is_empty() => {
                debug!(status = status.as_u16(), body = %body, "Submission response body")
            }
            Ok(_) => {}
            Err(e) => debug!(status = status.as_u16(), error = %e, "Could not read response body"),
        }

        Ok(status)
    }
}

#[async_trait]
impl ReportSubmitter for HttpTransport {
    async fn submit(&self, body: &[u8], compress: bool) -> SubmitOutcome {
        let payload = if compress {
            match gzip(body) {
                Ok(payload) => payload,
                Err(e) => {
                    return SubmitOutcome::TransportError {
                        message: UploadError::Compression(e).to_string(),
                    }
                }
            }
        } else {
            body.to_vec()
        };

        debug!(
            url = %self.config.endpoint,
            compressed = compress,
            raw_bytes = body.len(),
            sent_bytes = payload.len(),
            crc32 = crc32(&payload),
            "Submitting batch"
        );

        match self.send(payload, compress).await {
            Ok(status) => {
                let outcome = SubmitOutcome::from_status(status.as_u16());
                if outcome.is_accepted() {
                    info!(status = status.as_u16(), "Batch accepted");
                } else {
                    warn!(status = status.as_u16(), outcome = ?outcome, "Batch rejected");
                }
                outcome
            }
            Err(e) => {
                warn!(error = %e, "Submission failed");
                SubmitOutcome::TransportError {
                    message: e.to_string(),
                }
            }
        }
    }
}

/// Gzip a request body.
pub fn gzip(body: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
    encoder.write_all(body)?;
    encoder.finish()
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = Crc::new();
    crc.update(bytes);
    crc.sum()
}

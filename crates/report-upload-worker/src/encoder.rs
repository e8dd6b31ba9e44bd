//! Window encoding.
//!
//! A window of queued rows becomes one submission document:
//!
//! ```json
//! {"items": [{"time": "2024-03-01T12:00:00.000Z", "lat": 51.5, "lon": -0.12,
//!             "radio": "gsm", "cell": [...], "wifi": [...]}]}
//! ```
//!
//! `cell` and `wifi` are embedded verbatim from storage once they are known to
//! be JSON arrays. A row that cannot be encoded is skipped and logged; the
//! rest of the window still goes out.

use chrono::{DateTime, SecondsFormat};
use report_database::QueuedReport;
use serde::Serialize;
use serde_json::value::RawValue;
use thiserror::Error;
use tracing::warn;

/// Encoded window ready for submission.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Serialized `{"items": [...]}` document.
    pub body: Vec<u8>,
    /// Smallest row id in the window.
    pub min_id: i64,
    /// Largest row id in the window.
    pub max_id: i64,
    /// Rows actually encoded into `body`.
    pub observations: i64,
    /// Sum of `cell_count` over the window.
    pub cells: i64,
    /// Sum of `wifi_count` over the window.
    pub wifis: i64,
    /// Rows left out of `body` because they could not be encoded.
    pub skipped: usize,
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("window is empty")]
    EmptyWindow,

    #[error("no encodable rows in window {min_id}..={max_id} ({skipped} skipped)")]
    NothingEncodable {
        min_id: i64,
        max_id: i64,
        skipped: usize,
    },

    #[error("failed to serialize window: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct SubmitItem<'a> {
    time: String,
    lat: f64,
    lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    altitude: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    accuracy: Option<i64>,
    radio: &'a str,
    cell: &'a RawValue,
    wifi: &'a RawValue,
}

#[derive(Serialize)]
struct SubmitDocument<'a> {
    items: Vec<SubmitItem<'a>>,
}

/// Encode a window of rows, ascending by id.
///
/// `cells` and `wifis` cover every row of the window, skipped ones included,
/// matching what the collector counted when the rows were stored.
pub fn encode_batch(rows: &[QueuedReport]) -> Result<Batch, EncodeError> {
    let (first, last) = match (rows.first(), rows.last()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Err(EncodeError::EmptyWindow),
    };
    let min_id = first.id;
    let max_id = last.id;

    let mut items = Vec::with_capacity(rows.len());
    let mut skipped = 0;
    for row in rows {
        match encode_row(row) {
            Ok(item) => items.push(item),
            Err(reason) => {
                warn!(report_id = row.id, reason, "Skipping unencodable report");
                skipped += 1;
            }
        }
    }

    if items.is_empty() {
        return Err(EncodeError::NothingEncodable {
            min_id,
            max_id,
            skipped,
        });
    }

    let observations = items.len() as i64;
    let body = serde_json::to_vec(&SubmitDocument { items })?;

    Ok(Batch {
        body,
        min_id,
        max_id,
        observations,
        cells: rows.iter().map(|r| r.cell_count).sum(),
        wifis: rows.iter().map(|r| r.wifi_count).sum(),
        skipped,
    })
}

fn encode_row(row: &QueuedReport) -> Result<SubmitItem<'_>, &'static str> {
    let time = DateTime::from_timestamp_millis(row.timestamp)
        .ok_or("timestamp out of range")?
        .to_rfc3339_opts(SecondsFormat::Millis, true);

    if !row.latitude.is_finite() || !row.longitude.is_finite() {
        return Err("non-finite coordinates");
    }

    Ok(SubmitItem {
        time,
        lat: row.latitude,
        lon: row.longitude,
        altitude: row.altitude,
        accuracy: row.accuracy,
        radio: &row.radio,
        cell: json_array(&row.cell).ok_or("cell is not a JSON array")?,
        wifi: json_array(&row.wifi).ok_or("wifi is not a JSON array")?,
    })
}

fn json_array(raw: &str) -> Option<&RawValue> {
    let value: &RawValue = serde_json::from_str(raw).ok()?;
    value.get().starts_with('[').then_some(value)
}

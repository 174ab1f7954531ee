//! Destination table: watermark lookup and append-only sink.
//!
//! The pipeline only sees the `WatermarkStore` and `Sink` traits. The
//! BigQuery client implements both; tests drive the pipeline with an
//! in-memory table.

pub mod auth;
pub mod bigquery;
pub mod parquet;

pub use auth::{ServiceAccountKey, TokenProvider, CLOUD_PLATFORM_SCOPE};
pub use bigquery::BigQueryClient;

use crate::domain::FxRateRow;
use crate::error::EtlError;
use chrono::NaiveDate;
use tracing::{info, warn};

/// Watermark used when the destination has no usable history.
pub fn sentinel_watermark() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or(NaiveDate::MIN)
}

pub trait WatermarkStore {
    /// `MAX(end_of_day)` of the destination, `None` for an empty table.
    fn latest_end_of_day(&self) -> Result<Option<NaiveDate>, EtlError>;

    /// Latest persisted date, or the sentinel when the lookup fails or
    /// the table is empty. Never fails: no history means ingest everything.
    fn watermark(&self) -> NaiveDate {
        match self.latest_end_of_day() {
            Ok(Some(date)) => {
                info!(watermark = %date, "latest end_of_day found");
                date
            }
            Ok(None) => {
                let sentinel = sentinel_watermark();
                info!(watermark = %sentinel, "destination is empty, using sentinel watermark");
                sentinel
            }
            Err(e) => {
                let sentinel = sentinel_watermark();
                warn!(error = %e, watermark = %sentinel, "watermark lookup failed, using sentinel");
                sentinel
            }
        }
    }
}

pub trait Sink {
    /// Append rows to the destination. Never overwrites.
    fn append(&self, rows: &[FxRateRow]) -> Result<usize, EtlError>;

    /// Append only rows strictly newer than `watermark`.
    ///
    /// Returns the number of rows written; zero is not an error and skips
    /// the load entirely.
    fn append_new_rows(&self, rows: &[FxRateRow], watermark: NaiveDate) -> Result<usize, EtlError> {
        let fresh = rows_after(rows, watermark);
        if fresh.is_empty() {
            info!(%watermark, "nothing to write");
            return Ok(0);
        }
        info!(rows = fresh.len(), %watermark, "writing new rows");
        self.append(&fresh)
    }
}

/// Rows with `end_of_day > watermark`, order preserved.
///
/// Only the date is compared: a currency that first appears on an
/// already-ingested date is not written.
pub fn rows_after(rows: &[FxRateRow], watermark: NaiveDate) -> Vec<FxRateRow> {
    rows.iter()
        .filter(|r| r.end_of_day > watermark)
        .cloned()
        .collect()
}

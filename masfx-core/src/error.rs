//! Structured error type for the ingestion run.
//!
//! Every variant except `Warehouse` raised during the watermark lookup is
//! fatal: it propagates to the binary and ends the run with a non-zero exit.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error("rate feed unavailable: {0}")]
    FeedUnavailable(String),

    #[error("rate feed returned no records")]
    EmptyFeed,

    #[error("cross pair '{column}' needs anchor column '{anchor}', which the feed did not provide")]
    MissingAnchor { column: String, anchor: String },

    #[error("invalid rate column name '{column}': {reason}")]
    InvalidColumnName { column: String, reason: String },

    #[error("credential configuration error: {0}")]
    AuthConfiguration(String),

    #[error("warehouse error: {0}")]
    Warehouse(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("parquet encoding error: {0}")]
    Parquet(String),
}

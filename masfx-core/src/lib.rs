//! masfx core: MAS exchange-rate ingestion.
//!
//! - Feed client for the MAS datastore `search.json` resource
//! - Daily alignment with forward fill
//! - USD-anchored normalization of pairwise and cross quotes
//! - Long-format projection to `(end_of_day, timestamp, currency, fx_rate)`
//! - Watermark lookup and append-only BigQuery sink
//! - Single-pass pipeline wiring the stages together

pub mod config;
pub mod domain;
pub mod error;
pub mod feed;
pub mod pipeline;
pub mod transform;
pub mod warehouse;

pub use config::EtlConfig;
pub use error::EtlError;
pub use pipeline::{run_from_config, Pipeline, RunSummary};

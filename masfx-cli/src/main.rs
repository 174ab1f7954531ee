//! masfx: run one MAS FX ingestion pass.
//!
//! Takes no arguments. The config file is read from `MASFX_CONFIG`
//! (default `masfx.toml`); log filtering follows `RUST_LOG`.

use anyhow::{Context, Result};
use masfx_core::{run_from_config, EtlConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "masfx=info,masfx_core=info".into()),
        )
        .init();

    let config = EtlConfig::from_env().context("loading configuration")?;
    let summary = run_from_config(&config).context("ingestion run failed")?;

    info!(
        watermark = %summary.watermark,
        records = summary.records_fetched,
        days = summary.days_aligned,
        currencies = summary.currencies.len(),
        projected = summary.rows_projected,
        written = summary.rows_written,
        "finished"
    );
    Ok(())
}

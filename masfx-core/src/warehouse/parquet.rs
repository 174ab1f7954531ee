//! Parquet encoding of destination rows for load jobs.
//!
//! Schema: `end_of_day DATE, timestamp INT64, currency STRING, fx_rate DOUBLE`,
//! Snappy compressed.

use crate::domain::FxRateRow;
use crate::error::EtlError;
use chrono::NaiveDate;
use polars::prelude::*;

/// Destination column names, in schema order.
pub const COLUMNS: [&str; 4] = ["end_of_day", "timestamp", "currency", "fx_rate"];

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Convert rows to a Polars DataFrame.
pub fn rows_to_dataframe(rows: &[FxRateRow]) -> Result<DataFrame, EtlError> {
    let epoch = epoch();
    let dates: Vec<i32> = rows
        .iter()
        .map(|r| (r.end_of_day - epoch).num_days() as i32)
        .collect();
    let timestamps: Vec<i64> = rows.iter().map(|r| r.timestamp).collect();
    let currencies: Vec<&str> = rows.iter().map(|r| r.currency.as_str()).collect();
    let rates: Vec<f64> = rows.iter().map(|r| r.fx_rate).collect();

    DataFrame::new(vec![
        Column::new(COLUMNS[0].into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| EtlError::Parquet(format!("date cast: {e}")))?,
        Column::new(COLUMNS[1].into(), timestamps),
        Column::new(COLUMNS[2].into(), currencies),
        Column::new(COLUMNS[3].into(), rates),
    ])
    .map_err(|e| EtlError::Parquet(format!("dataframe creation: {e}")))
}

/// Encode rows as an in-memory Parquet file.
pub fn encode_rows(rows: &[FxRateRow]) -> Result<Vec<u8>, EtlError> {
    let mut df = rows_to_dataframe(rows)?;
    let mut buf = Vec::new();
    ParquetWriter::new(&mut buf)
        .with_compression(ParquetCompression::Snappy)
        .finish(&mut df)
        .map_err(|e| EtlError::Parquet(format!("write parquet: {e}")))?;
    Ok(buf)
}

/// Decode a Parquet file produced by [`encode_rows`].
#[cfg(test)]
fn decode_rows(bytes: &[u8]) -> Result<Vec<FxRateRow>, EtlError> {
    let df = ParquetReader::new(std::io::Cursor::new(bytes))
        .finish()
        .map_err(|e| EtlError::Parquet(format!("read parquet: {e}")))?;

    for name in COLUMNS {
        if df.column(name).is_err() {
            return Err(EtlError::Parquet(format!("missing column '{name}'")));
        }
    }

    dataframe_to_rows(&df)
}

#[cfg(test)]
fn dataframe_to_rows(df: &DataFrame) -> Result<Vec<FxRateRow>, EtlError> {
    let map_err = |e: PolarsError| EtlError::Parquet(format!("column read: {e}"));

    let date_ca = df.column(COLUMNS[0]).map_err(map_err)?.date().map_err(map_err)?;
    let ts_ca = df.column(COLUMNS[1]).map_err(map_err)?.i64().map_err(map_err)?;
    let cur_ca = df.column(COLUMNS[2]).map_err(map_err)?.str().map_err(map_err)?;
    let rate_ca = df.column(COLUMNS[3]).map_err(map_err)?.f64().map_err(map_err)?;

    let epoch = epoch();
    (0..df.height())
        .map(|i| {
            let null = |col: &str| EtlError::Parquet(format!("null {col} at row {i}"));
            let days = date_ca.get(i).ok_or_else(|| null(COLUMNS[0]))?;
            Ok(FxRateRow {
                end_of_day: epoch + chrono::Duration::days(i64::from(days)),
                timestamp: ts_ca.get(i).ok_or_else(|| null(COLUMNS[1]))?,
                currency: cur_ca.get(i).ok_or_else(|| null(COLUMNS[2]))?.to_string(),
                fx_rate: rate_ca.get(i).ok_or_else(|| null(COLUMNS[3]))?,
            })
        })
        .collect()
}

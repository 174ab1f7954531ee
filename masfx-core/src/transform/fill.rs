//! Daily alignment with forward fill.
//!
//! Unlike tradable price data, published FX fixings are carried over
//! non-publishing days: a weekend or holiday takes the last published value.

use crate::domain::RawRateRecord;
use crate::error::EtlError;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Records aligned to a continuous daily axis.
///
/// Every inner vector has the same length as `dates`.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedRateTable {
    /// Every calendar day from the first to the last observed date, ascending.
    pub dates: Vec<NaiveDate>,
    /// Publication timestamp, forward-filled.
    pub timestamps: Vec<i64>,
    /// Rate columns in first-seen feed order, forward-filled.
    pub columns: Vec<(String, Vec<Option<f64>>)>,
}

impl AlignedRateTable {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }
}

/// Build the daily table spanning `min(end_of_day)..=max(end_of_day)`.
///
/// A date published more than once keeps its last record. `None` and NaN
/// both count as missing. A column that is missing before its first
/// observation stays `None`.
pub fn fill_missing_dates(records: &[RawRateRecord]) -> Result<AlignedRateTable, EtlError> {
    let mut by_date: BTreeMap<NaiveDate, &RawRateRecord> = BTreeMap::new();
    let mut column_order: Vec<&str> = Vec::new();
    for record in records {
        by_date.insert(record.end_of_day, record);
        for (name, _) in &record.rates {
            if !column_order.contains(&name.as_str()) {
                column_order.push(name);
            }
        }
    }

    let (first, last) = match (by_date.keys().next(), by_date.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(EtlError::EmptyFeed),
    };

    let days = (last - first).num_days() as usize + 1;
    let mut dates = Vec::with_capacity(days);
    let mut timestamps = Vec::with_capacity(days);
    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(days); column_order.len()];

    let mut last_timestamp = 0;
    let mut last_values: Vec<Option<f64>> = vec![None; column_order.len()];

    for date in first.iter_days().take(days) {
        if let Some(record) = by_date.get(&date) {
            last_timestamp = record.timestamp;
            for (slot, name) in last_values.iter_mut().zip(&column_order) {
                if let Some(v) = record.rate(name).filter(|v| !v.is_nan()) {
                    *slot = Some(v);
                }
            }
        }
        dates.push(date);
        timestamps.push(last_timestamp);
        for (column, value) in values.iter_mut().zip(&last_values) {
            column.push(*value);
        }
    }

    let columns = column_order
        .into_iter()
        .map(str::to_string)
        .zip(values)
        .collect();

    Ok(AlignedRateTable {
        dates,
        timestamps,
        columns,
    })
}

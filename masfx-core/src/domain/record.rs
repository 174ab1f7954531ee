//! Feed records and the persisted long-format row.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One published day from the feed, before alignment.
///
/// `rates` keeps the feed's column order; a `None` value is a column the
/// feed listed but left empty for this day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRateRecord {
    pub end_of_day: NaiveDate,
    pub timestamp: i64,
    pub rates: Vec<(String, Option<f64>)>,
}

impl RawRateRecord {
    pub fn new(end_of_day: NaiveDate, timestamp: i64) -> Self {
        Self {
            end_of_day,
            timestamp,
            rates: Vec::new(),
        }
    }

    /// Builder-style helper used by tests and fixtures.
    pub fn with_rate(mut self, column: &str, value: f64) -> Self {
        self.set_rate(column, Some(value));
        self
    }

    /// Set a rate column, replacing an existing value in place.
    pub fn set_rate(&mut self, column: &str, value: Option<f64>) {
        match self.rates.iter_mut().find(|(name, _)| name == column) {
            Some(slot) => slot.1 = value,
            None => self.rates.push((column.to_string(), value)),
        }
    }

    /// Look up a rate column by name.
    pub fn rate(&self, column: &str) -> Option<f64> {
        self.rates
            .iter()
            .find(|(name, _)| name == column)
            .and_then(|(_, v)| *v)
    }
}

/// A single row of the destination table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxRateRow {
    pub end_of_day: NaiveDate,
    pub timestamp: i64,
    pub currency: String,
    pub fx_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_rate_replaces_existing_column() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let mut record = RawRateRecord::new(date, 1).with_rate("usd_sgd", 1.3);
        record.set_rate("usd_sgd", Some(1.4));
        record.set_rate("eur_sgd", None);

        assert_eq!(record.rates.len(), 2);
        assert_eq!(record.rate("usd_sgd"), Some(1.4));
        assert_eq!(record.rate("eur_sgd"), None);
        assert_eq!(record.rate("gbp_sgd"), None);
    }
}

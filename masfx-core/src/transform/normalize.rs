//! USD-anchored normalization of pairwise quotes.
//!
//! Each rate column `{from}_{to}[_{divisor}]` contributes one derived
//! column per currency:
//!
//! - a direct quote (`usd_{to}`) sets `usd = 1.0` and `{to} = 1 / quote`
//! - a cross quote (`{from}_{to}`) sets `{from} = quote / usd_sgd`
//!
//! Divisors are applied to the quote column first, in place, so a cross
//! rate always sees the per-unit quote.

use super::fill::AlignedRateTable;
use crate::domain::{PairColumn, BASE_CURRENCY};
use crate::error::EtlError;
use chrono::NaiveDate;

/// Direct USD quote that every cross rate is divided by.
pub const ANCHOR_COLUMN: &str = "usd_sgd";

type ColumnValues = Vec<Option<f64>>;

/// The aligned table plus one derived column per currency code.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRateTable {
    /// Source table with divisor-adjusted quote columns.
    pub aligned: AlignedRateTable,
    /// Derived per-currency columns in first-written order.
    pub derived: Vec<(String, ColumnValues)>,
}

impl NormalizedRateTable {
    pub fn len(&self) -> usize {
        self.aligned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aligned.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.aligned.dates
    }

    pub fn timestamps(&self) -> &[i64] {
        &self.aligned.timestamps
    }

    /// Derived column for a currency code.
    pub fn rate(&self, code: &str) -> Option<&[Option<f64>]> {
        self.derived
            .iter()
            .find(|(c, _)| c == code)
            .map(|(_, values)| values.as_slice())
    }

    /// Divisor-adjusted source quote column.
    pub fn quote(&self, column: &str) -> Option<&[Option<f64>]> {
        self.aligned.column(column)
    }
}

/// Derive per-currency USD rates from every quote column in `table`.
///
/// Returns the table and the produced currency codes in the order they
/// were produced. `usd` appears once per direct quote column.
pub fn normalize(
    mut table: AlignedRateTable,
) -> Result<(NormalizedRateTable, Vec<String>), EtlError> {
    let rows = table.len();
    let mut derived: Vec<(String, ColumnValues)> = Vec::new();
    let mut codes: Vec<String> = Vec::new();

    for idx in 0..table.columns.len() {
        let pair = PairColumn::parse(&table.columns[idx].0)?;

        if let Some(divisor) = pair.divisor {
            let divisor = f64::from(divisor);
            for value in table.columns[idx].1.iter_mut().flatten() {
                *value /= divisor;
            }
        }

        let quote = &table.columns[idx].1;
        if pair.is_direct() {
            set_derived(&mut derived, BASE_CURRENCY, vec![Some(1.0); rows]);
            codes.push(BASE_CURRENCY.to_string());

            let inverted = quote.iter().map(|q| q.map(|q| 1.0 / q)).collect();
            set_derived(&mut derived, &pair.to, inverted);
            codes.push(pair.to);
        } else {
            let anchor = table
                .column(ANCHOR_COLUMN)
                .ok_or_else(|| EtlError::MissingAnchor {
                    column: pair.to_string(),
                    anchor: ANCHOR_COLUMN.to_string(),
                })?;

            let cross = quote
                .iter()
                .zip(anchor)
                .map(|(q, a)| match (q, a) {
                    (Some(q), Some(a)) => Some(q / a),
                    _ => None,
                })
                .collect();
            set_derived(&mut derived, &pair.from, cross);
            codes.push(pair.from);
        }
    }

    Ok((
        NormalizedRateTable {
            aligned: table,
            derived,
        },
        codes,
    ))
}

/// Write a derived column, replacing an earlier column for the same code.
fn set_derived(derived: &mut Vec<(String, ColumnValues)>, code: &str, values: ColumnValues) {
    match derived.iter_mut().find(|(c, _)| c == code) {
        Some(slot) => slot.1 = values,
        None => derived.push((code.to_string(), values)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(columns: Vec<(&str, Vec<Option<f64>>)>) -> AlignedRateTable {
        let rows = columns.first().map(|(_, v)| v.len()).unwrap_or(0);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        AlignedRateTable {
            dates: start.iter_days().take(rows).collect(),
            timestamps: (0..rows as i64).collect(),
            columns: columns
                .into_iter()
                .map(|(n, v)| (n.to_string(), v))
                .collect(),
        }
    }

    fn assert_close(actual: Option<f64>, expected: f64) {
        let actual = actual.expect("value should be present");
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn direct_quote_is_inverted_and_usd_anchored() {
        let (norm, codes) = normalize(table(vec![("usd_sgd", vec![Some(1.25), Some(1.6)])])).unwrap();

        assert_eq!(codes, vec!["usd", "sgd"]);
        assert_eq!(norm.rate("usd").unwrap(), &[Some(1.0), Some(1.0)]);
        assert_close(norm.rate("sgd").unwrap()[0], 0.8);
        assert_close(norm.rate("sgd").unwrap()[1], 0.625);
    }

    #[test]
    fn divisor_is_applied_before_inversion() {
        let (norm, _) = normalize(table(vec![("usd_jpy_100", vec![Some(10000.0)])])).unwrap();

        assert_close(norm.quote("usd_jpy_100").unwrap()[0], 100.0);
        assert_close(norm.rate("jpy").unwrap()[0], 0.01);
    }

    #[test]
    fn cross_rate_divides_by_anchor() {
        let (norm, codes) = normalize(table(vec![
            ("usd_sgd", vec![Some(1.35)]),
            ("eur_sgd", vec![Some(1.20)]),
        ]))
        .unwrap();

        assert_eq!(codes, vec!["usd", "sgd", "eur"]);
        assert_close(norm.rate("eur").unwrap()[0], 1.20 / 1.35);
    }

    #[test]
    fn cross_rate_with_divisor_uses_per_unit_quote() {
        let (norm, _) = normalize(table(vec![
            ("jpy_sgd_100", vec![Some(0.93)]),
            ("usd_sgd", vec![Some(1.33)]),
        ]))
        .unwrap();

        assert_close(norm.rate("jpy").unwrap()[0], 0.0093 / 1.33);
    }

    #[test]
    fn missing_operand_yields_missing_rate() {
        let (norm, _) = normalize(table(vec![
            ("usd_sgd", vec![None, Some(1.3)]),
            ("eur_sgd", vec![Some(1.4), Some(1.45)]),
        ]))
        .unwrap();

        assert_eq!(norm.rate("usd").unwrap(), &[Some(1.0), Some(1.0)]);
        assert_eq!(norm.rate("sgd").unwrap()[0], None);
        assert_eq!(norm.rate("eur").unwrap()[0], None);
        assert_close(norm.rate("eur").unwrap()[1], 1.45 / 1.3);
    }

    #[test]
    fn cross_pair_without_anchor_fails() {
        let err = normalize(table(vec![("eur_sgd", vec![Some(1.4)])])).unwrap_err();
        assert!(matches!(
            err,
            EtlError::MissingAnchor { ref column, ref anchor } if column == "eur_sgd" && anchor == "usd_sgd"
        ));
    }

    #[test]
    fn several_direct_quotes_repeat_usd_code() {
        let (norm, codes) = normalize(table(vec![
            ("usd_sgd", vec![Some(1.3)]),
            ("usd_myr", vec![Some(4.7)]),
        ]))
        .unwrap();

        assert_eq!(codes, vec!["usd", "sgd", "usd", "myr"]);
        assert_eq!(norm.derived.len(), 3);
    }

    #[test]
    fn later_column_overwrites_same_currency() {
        let (norm, codes) = normalize(table(vec![
            ("usd_sgd", vec![Some(1.3)]),
            ("usd_jpy", vec![Some(150.0)]),
            ("jpy_sgd_100", vec![Some(0.9)]),
        ]))
        .unwrap();

        assert_eq!(codes, vec!["usd", "sgd", "usd", "jpy", "jpy"]);
        assert_close(norm.rate("jpy").unwrap()[0], 0.009 / 1.3);
    }

    #[test]
    fn unparseable_column_is_rejected() {
        let err = normalize(table(vec![("usd_sgd_x", vec![Some(1.0)])])).unwrap_err();
        assert!(matches!(err, EtlError::InvalidColumnName { .. }));
    }
}

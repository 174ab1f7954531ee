//! Long-format projection.

use super::normalize::NormalizedRateTable;
use crate::domain::FxRateRow;

/// Reshape derived currency columns into destination rows.
///
/// Rows are currency-major in `codes` order, then date-ascending. A code
/// listed more than once is emitted once, at its first position; codes with
/// no derived column are skipped. Missing and NaN rates produce no row.
pub fn project(table: &NormalizedRateTable, codes: &[String]) -> Vec<FxRateRow> {
    let mut seen: Vec<&str> = Vec::with_capacity(codes.len());
    let mut rows = Vec::new();

    for code in codes {
        if seen.contains(&code.as_str()) {
            continue;
        }
        seen.push(code);

        let Some(values) = table.rate(code) else {
            continue;
        };

        let slice = table
            .dates()
            .iter()
            .zip(table.timestamps())
            .zip(values)
            .filter_map(|((date, timestamp), value)| match value {
                Some(rate) if !rate.is_nan() => Some(FxRateRow {
                    end_of_day: *date,
                    timestamp: *timestamp,
                    currency: code.clone(),
                    fx_rate: *rate,
                }),
                _ => None,
            });
        rows.extend(slice);
    }

    rows
}

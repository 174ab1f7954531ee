//! Rate column naming convention.
//!
//! The feed encodes each quote in its column name: `{from}_{to}` or
//! `{from}_{to}_{divisor}`, e.g. `usd_sgd` or `jpy_sgd_100`. A divisor means
//! the published value is per `divisor` units of `from`.

use crate::error::EtlError;
use std::fmt;
use std::str::FromStr;

/// All derived rates are expressed against this currency.
pub const BASE_CURRENCY: &str = "usd";

/// Feed columns that are never rate columns.
pub const DATE_COLUMN: &str = "end_of_day";
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// A parsed rate column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairColumn {
    pub from: String,
    pub to: String,
    pub divisor: Option<u32>,
}

impl PairColumn {
    /// Parse a column name, rejecting anything outside the naming convention.
    pub fn parse(column: &str) -> Result<Self, EtlError> {
        let invalid = |reason: &str| EtlError::InvalidColumnName {
            column: column.to_string(),
            reason: reason.to_string(),
        };

        let parts: Vec<&str> = column.split('_').collect();
        let (from, to, divisor) = match parts.as_slice() {
            [from, to] => (*from, *to, None),
            [from, to, divisor] => (*from, *to, Some(*divisor)),
            _ => return Err(invalid("expected {from}_{to} or {from}_{to}_{divisor}")),
        };

        if !is_currency_code(from) {
            return Err(invalid("source currency must be alphabetic"));
        }
        if !is_currency_code(to) {
            return Err(invalid("quote currency must be alphabetic"));
        }

        let divisor = match divisor {
            None => None,
            Some(raw) => match raw.parse::<u32>() {
                Ok(0) => return Err(invalid("divisor must be positive")),
                Ok(d) => Some(d),
                Err(_) => return Err(invalid("divisor must be an integer")),
            },
        };

        Ok(Self {
            from: from.to_string(),
            to: to.to_string(),
            divisor,
        })
    }

    /// True when the column quotes the base currency directly (`usd_*`).
    pub fn is_direct(&self) -> bool {
        self.from == BASE_CURRENCY
    }
}

impl FromStr for PairColumn {
    type Err = EtlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for PairColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.divisor {
            Some(d) => write!(f, "{}_{}_{d}", self.from, self.to),
            None => write!(f, "{}_{}", self.from, self.to),
        }
    }
}

/// Whether a feed column carries a rate.
///
/// Rate columns contain an underscore. `end_of_day`, `timestamp` and
/// datastore bookkeeping fields (leading underscore, e.g. `_id`) do not count.
pub fn is_rate_column(column: &str) -> bool {
    column != DATE_COLUMN
        && column != TIMESTAMP_COLUMN
        && !column.starts_with('_')
        && column.contains('_')
}

fn is_currency_code(part: &str) -> bool {
    !part.is_empty() && part.chars().all(|c| c.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_part_name() {
        let pair = PairColumn::parse("usd_sgd").unwrap();
        assert_eq!(pair.from, "usd");
        assert_eq!(pair.to, "sgd");
        assert_eq!(pair.divisor, None);
        assert!(pair.is_direct());
    }

    #[test]
    fn parses_divisor() {
        let pair: PairColumn = "jpy_sgd_100".parse().unwrap();
        assert_eq!(pair.from, "jpy");
        assert_eq!(pair.divisor, Some(100));
        assert!(!pair.is_direct());
        assert_eq!(pair.to_string(), "jpy_sgd_100");
    }

    #[test]
    fn rejects_malformed_names() {
        for bad in ["usd", "usd_sgd_100_x", "usd__sgd", "usd_sgd_abc", "usd_sgd_0", "us1_sgd"] {
            let err = PairColumn::parse(bad).unwrap_err();
            assert!(
                matches!(err, EtlError::InvalidColumnName { ref column, .. } if column == bad),
                "expected InvalidColumnName for {bad}, got {err:?}"
            );
        }
    }

    #[test]
    fn metadata_columns_are_not_rates() {
        assert!(is_rate_column("usd_sgd"));
        assert!(is_rate_column("cny_sgd_100"));
        assert!(!is_rate_column("end_of_day"));
        assert!(!is_rate_column("timestamp"));
        assert!(!is_rate_column("preliminary"));
        assert!(!is_rate_column("_id"));
    }
}

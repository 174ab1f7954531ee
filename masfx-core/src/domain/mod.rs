//! Domain types for the MAS FX feed

pub mod pair;
pub mod record;

pub use pair::{PairColumn, BASE_CURRENCY};
pub use record::{FxRateRow, RawRateRecord};

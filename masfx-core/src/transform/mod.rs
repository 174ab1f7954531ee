//! Wide-to-long transform stages.
//!
//! `fill` aligns raw records onto a continuous daily axis, `normalize`
//! derives one USD-anchored column per currency, and `project` reshapes the
//! derived columns into destination rows.

pub mod fill;
pub mod normalize;
pub mod project;

pub use fill::{fill_missing_dates, AlignedRateTable};
pub use normalize::{normalize, NormalizedRateTable, ANCHOR_COLUMN};
pub use project::project;

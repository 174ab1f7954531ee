//! Rate feed trait and the MAS datastore client.
//!
//! The `RateFeed` trait abstracts over the source so the pipeline can be
//! driven by an in-memory feed in tests.

pub mod mas;

pub use mas::{parse_response, MasFeedClient};

use crate::domain::RawRateRecord;
use crate::error::EtlError;

pub trait RateFeed {
    /// Human-readable name of this feed.
    fn name(&self) -> &str;

    /// Fetch every record the feed currently publishes.
    fn fetch(&self) -> Result<Vec<RawRateRecord>, EtlError>;
}

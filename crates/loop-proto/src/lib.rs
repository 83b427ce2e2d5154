//! Value types and pure functions for the loop status engine: the
//! device-status feed parser, the status snapshot built from it, freshness
//! classification, the one-line status summary, and the on-disk config and
//! settings the daemon runs with.

pub mod config;
pub mod entry;
pub mod feed;
pub mod freshness;
pub mod platform;
pub mod settings;
pub mod snapshot;
pub mod summary;

pub use entry::{EnactedBasal, StatusEntry};
pub use feed::{parse_feed, parse_feed_report, parse_feed_slice, FeedError, FeedReport, SkipReason};
pub use freshness::{classify, minutes_since, FreshnessState};
pub use snapshot::{PredictedReading, PredictedReadings, StatusSnapshot};
pub use summary::{LoopSummary, SummaryInfo};

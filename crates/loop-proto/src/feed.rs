//! Device-status feed parsing.
//!
//! The feed is a JSON array of records, most recent first. Records that carry
//! a `loop` object become [`StatusEntry`] values; everything else is skipped
//! one record at a time, so a single malformed record never fails the feed.
//!
//! ```text
//! { "_id": "...",
//!   "loop": { "timestamp": "2019-06-18T10:15:30Z",
//!             "failureReason": "...",
//!             "enacted": { "rate": 0.8, "timestamp": "...", "duration": 30 },
//!             "recommendedTempBasal": { "rate": 0.6 },
//!             "recommendedBolus": 0.25,
//!             "predicted": { "values": [110, 112], "startDate": "..." },
//!             "iob": { "iob": 1.2 },
//!             "cob": { "cob": 15 } } }
//! ```

use serde_json::Value;
use tracing::debug;

use crate::entry::{parse_timestamp, EnactedBasal, StatusEntry};
use crate::snapshot::StatusSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed contains no valid loop entries")]
    EmptyFeed,

    #[error("feed payload is not a JSON array")]
    NotAnArray,

    #[error("feed payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Why a feed record did not become an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The record is not a JSON object.
    NotAnObject,
    /// The record has no `loop` object. Normal for non-loop uploaders.
    NoLoopDecision,
    /// The loop record has no string `_id`.
    MissingId,
    /// The loop record's timestamp is absent or in an unknown layout.
    InvalidTimestamp,
    /// The loop record has a `predicted` object without numeric `values` or
    /// a parseable `startDate`.
    InvalidPrediction,
}

impl SkipReason {
    /// Malformed loop records, as opposed to records that were never loop
    /// decisions in the first place.
    pub fn is_malformed(self) -> bool {
        matches!(
            self,
            Self::MissingId | Self::InvalidTimestamp | Self::InvalidPrediction
        )
    }
}

/// Outcome of parsing one feed record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Entry(StatusEntry),
    Skipped(SkipReason),
}

/// Everything the parser saw in one payload.
#[derive(Debug, Clone, Default)]
pub struct FeedReport {
    /// Valid entries, in feed order.
    pub entries: Vec<StatusEntry>,
    /// Index into the payload array and the reason for every skipped record.
    pub skipped: Vec<(usize, SkipReason)>,
}

impl FeedReport {
    /// Loop records dropped because they were malformed.
    pub fn dropped(&self) -> usize {
        self.skipped.iter().filter(|(_, r)| r.is_malformed()).count()
    }

    pub fn into_snapshot(self) -> Result<StatusSnapshot, FeedError> {
        StatusSnapshot::new(self.entries)
    }
}

/// Parse a single feed record.
pub fn parse_record(record: &Value) -> RecordOutcome {
    let Some(object) = record.as_object() else {
        return RecordOutcome::Skipped(SkipReason::NotAnObject);
    };
    let Some(decision) = object.get("loop").filter(|v| v.is_object()) else {
        return RecordOutcome::Skipped(SkipReason::NoLoopDecision);
    };
    let Some(id) = object.get("_id").and_then(Value::as_str) else {
        return RecordOutcome::Skipped(SkipReason::MissingId);
    };
    let Some(timestamp) = decision["timestamp"].as_str().and_then(parse_timestamp) else {
        return RecordOutcome::Skipped(SkipReason::InvalidTimestamp);
    };

    let prediction = match decision.get("predicted").filter(|v| v.is_object()) {
        Some(predicted) => match parse_predicted(predicted) {
            Some(prediction) => Some(prediction),
            None => return RecordOutcome::Skipped(SkipReason::InvalidPrediction),
        },
        None => None,
    };

    let mut entry = StatusEntry::new(id, timestamp);
    entry.failure_reason = decision["failureReason"].as_str().map(str::to_string);
    entry.enacted_basal = parse_enacted(&decision["enacted"]);
    entry.recommended_basal_rate = decision["recommendedTempBasal"]["rate"].as_f64();
    entry.recommended_bolus = decision["recommendedBolus"].as_f64();
    if let Some((values, start)) = prediction {
        entry.predicted_values = Some(values);
        entry.predicted_values_start_time = Some(start);
    }
    entry.insulin_on_board = decision["iob"]["iob"].as_f64().unwrap_or(0.0);
    entry.carbs_on_board = decision["cob"]["cob"].as_f64().unwrap_or(0.0);

    RecordOutcome::Entry(entry)
}

fn parse_enacted(value: &Value) -> Option<EnactedBasal> {
    Some(EnactedBasal {
        duration_minutes: value["duration"].as_f64()?,
        rate: value["rate"].as_f64()?,
        timestamp: value["timestamp"].as_str().and_then(parse_timestamp)?,
    })
}

fn parse_predicted(value: &Value) -> Option<(Vec<f64>, chrono::DateTime<chrono::Utc>)> {
    let values = value["values"]
        .as_array()?
        .iter()
        .map(Value::as_f64)
        .collect::<Option<Vec<_>>>()?;
    let start = value["startDate"].as_str().and_then(parse_timestamp)?;
    Some((values, start))
}

/// Parse every record of a payload, keeping the skip reasons.
pub fn parse_feed_report(payload: &Value) -> Result<FeedReport, FeedError> {
    let records = payload.as_array().ok_or(FeedError::NotAnArray)?;

    let mut report = FeedReport::default();
    for (idx, record) in records.iter().enumerate() {
        match parse_record(record) {
            RecordOutcome::Entry(entry) => report.entries.push(entry),
            RecordOutcome::Skipped(reason) => report.skipped.push((idx, reason)),
        }
    }

    if report.dropped() > 0 {
        debug!(
            "feed: {} entries, {} malformed records dropped",
            report.entries.len(),
            report.dropped()
        );
    }
    Ok(report)
}

/// Parse a payload into a snapshot. Fails with [`FeedError::EmptyFeed`] when
/// no record survives.
pub fn parse_feed(payload: &Value) -> Result<StatusSnapshot, FeedError> {
    parse_feed_report(payload)?.into_snapshot()
}

pub fn parse_feed_slice(bytes: &[u8]) -> Result<StatusSnapshot, FeedError> {
    let payload: Value = serde_json::from_slice(bytes)?;
    parse_feed(&payload)
}

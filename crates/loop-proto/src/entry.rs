use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layouts accepted in the device-status feed, tried in order.
/// Both are UTC with a literal `Z` suffix.
pub const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.3fZ", "%Y-%m-%dT%H:%M:%SZ"];

/// Parse an ISO-8601 feed timestamp. The first layout that matches wins.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    TIMESTAMP_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(s, fmt)
            .ok()
            .map(|naive| naive.and_utc())
    })
}

/// A temporary basal adjustment, valid from `timestamp` for `duration_minutes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnactedBasal {
    pub rate: f64,
    pub timestamp: DateTime<Utc>,
    pub duration_minutes: f64,
}

impl EnactedBasal {
    /// End of the validity window, or `None` when it lies beyond the
    /// representable date range.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let millis = self.duration_minutes * 60_000.0;
        if !millis.is_finite() || millis.abs() >= i64::MAX as f64 {
            return None;
        }
        Duration::try_milliseconds(millis as i64)
            .and_then(|duration| self.timestamp.checked_add_signed(duration))
    }

    /// True while the window has not elapsed at `now`. An out-of-range
    /// window never closes when the duration is positive and is already
    /// closed otherwise.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at() {
            Some(end) => end > now,
            None => self.duration_minutes > 0.0,
        }
    }
}

/// One loop decision from the device-status feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Forecast values at 5-minute spacing, anchored at `predicted_values_start_time`.
    pub predicted_values: Option<Vec<f64>>,
    pub predicted_values_start_time: Option<DateTime<Utc>>,
    pub recommended_bolus: Option<f64>,
    pub recommended_basal_rate: Option<f64>,
    pub enacted_basal: Option<EnactedBasal>,
    #[serde(default)]
    pub insulin_on_board: f64,
    #[serde(default)]
    pub carbs_on_board: f64,
    pub failure_reason: Option<String>,
}

impl StatusEntry {
    /// An entry carrying only the mandatory fields.
    pub fn new(id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            predicted_values: None,
            predicted_values_start_time: None,
            recommended_bolus: None,
            recommended_basal_rate: None,
            enacted_basal: None,
            insulin_on_board: 0.0,
            carbs_on_board: 0.0,
            failure_reason: None,
        }
    }
}

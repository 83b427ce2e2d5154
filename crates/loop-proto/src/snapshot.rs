use chrono::{DateTime, Duration, Utc};

use crate::entry::StatusEntry;
use crate::feed::FeedError;
use crate::freshness::{self, FreshnessState, REFRESH_AFTER_MINUTES};

/// Spacing between consecutive predicted values.
pub const PREDICTION_STEP_MINUTES: i64 = 5;

/// The current loop status, built from a non-empty, most-recent-first list of
/// entries. Immutable; a newer fetch replaces it wholesale.
///
/// Scalar fields come from the first entry. The prediction comes from the
/// first entry that has one, and the enacted basal from the first entry whose
/// basal window is still open at the evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    entries: Vec<StatusEntry>,
}

impl StatusSnapshot {
    pub fn new(entries: Vec<StatusEntry>) -> Result<Self, FeedError> {
        if entries.is_empty() {
            return Err(FeedError::EmptyFeed);
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    fn latest(&self) -> &StatusEntry {
        &self.entries[0]
    }

    /// Identity used for deduplication: the most recent entry's id.
    pub fn id(&self) -> &str {
        &self.latest().id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.latest().timestamp
    }

    fn predicting_entry(&self) -> Option<&StatusEntry> {
        self.entries.iter().find(|e| e.predicted_values.is_some())
    }

    pub fn predicted_values(&self) -> Option<&[f64]> {
        self.predicting_entry()
            .and_then(|e| e.predicted_values.as_deref())
    }

    pub fn predicted_values_start_time(&self) -> Option<DateTime<Utc>> {
        self.predicting_entry()
            .and_then(|e| e.predicted_values_start_time)
    }

    /// The prediction as timed readings. Computed on every call; the returned
    /// iterator is `Clone`, so it can be restarted.
    pub fn predicted_readings(&self) -> PredictedReadings<'_> {
        let series = self
            .predicting_entry()
            .and_then(|e| Some((e.predicted_values.as_deref()?, e.predicted_values_start_time?)));
        match series {
            Some((values, start)) => PredictedReadings {
                values,
                start,
                index: 0,
            },
            None => PredictedReadings {
                values: &[],
                start: self.timestamp(),
                index: 0,
            },
        }
    }

    pub fn recommended_bolus(&self) -> Option<f64> {
        self.latest().recommended_bolus
    }

    pub fn recommended_basal_rate(&self) -> Option<f64> {
        self.latest().recommended_basal_rate
    }

    pub fn insulin_on_board(&self) -> f64 {
        self.latest().insulin_on_board
    }

    pub fn carbs_on_board(&self) -> f64 {
        self.latest().carbs_on_board
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.latest().failure_reason.as_deref()
    }

    /// Rate of the most recent enacted basal still running at `now`.
    pub fn enacted_basal_rate(&self, now: DateTime<Utc>) -> Option<f64> {
        self.entries
            .iter()
            .filter_map(|e| e.enacted_basal.as_ref())
            .find(|basal| basal.is_active_at(now))
            .map(|basal| basal.rate)
    }

    pub fn minutes_ago(&self, now: DateTime<Utc>) -> i64 {
        freshness::minutes_since(self.timestamp(), now)
    }

    pub fn freshness(&self, now: DateTime<Utc>) -> FreshnessState {
        freshness::classify(self.timestamp(), now)
    }

    pub fn should_refresh(&self, now: DateTime<Utc>) -> bool {
        self.minutes_ago(now) >= REFRESH_AFTER_MINUTES
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedReading {
    pub value: f64,
    pub at: DateTime<Utc>,
}

/// Iterator over a snapshot's predicted series.
#[derive(Debug, Clone)]
pub struct PredictedReadings<'a> {
    values: &'a [f64],
    start: DateTime<Utc>,
    index: usize,
}

impl Iterator for PredictedReadings<'_> {
    type Item = PredictedReading;

    fn next(&mut self) -> Option<Self::Item> {
        let value = *self.values.get(self.index)?;
        let at = self.start + Duration::minutes(PREDICTION_STEP_MINUTES * self.index as i64);
        self.index += 1;
        Some(PredictedReading { value, at })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.values.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PredictedReadings<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EnactedBasal;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 6, 18, 12, 0, 0).unwrap()
    }

    fn entry(id: &str, minutes_ago: i64) -> StatusEntry {
        StatusEntry::new(id, now() - Duration::minutes(minutes_ago))
    }

    fn basal(rate: f64, started_minutes_ago: i64, duration_minutes: f64) -> EnactedBasal {
        EnactedBasal {
            rate,
            timestamp: now() - Duration::minutes(started_minutes_ago),
            duration_minutes,
        }
    }

    #[test]
    fn test_empty_is_rejected() {
        assert!(matches!(StatusSnapshot::new(vec![]), Err(FeedError::EmptyFeed)));
    }

    #[test]
    fn test_scalars_come_from_latest_entry_only() {
        let mut latest = entry("latest", 1);
        latest.insulin_on_board = 0.5;
        let mut older = entry("older", 6);
        older.recommended_bolus = Some(1.0);
        older.recommended_basal_rate = Some(0.9);
        older.failure_reason = Some("old failure".into());
        older.carbs_on_board = 20.0;

        let snapshot = StatusSnapshot::new(vec![latest, older]).unwrap();
        assert_eq!(snapshot.id(), "latest");
        assert_eq!(snapshot.timestamp(), now() - Duration::minutes(1));
        assert_eq!(snapshot.insulin_on_board(), 0.5);
        assert_eq!(snapshot.carbs_on_board(), 0.0);
        assert!(snapshot.recommended_bolus().is_none());
        assert!(snapshot.recommended_basal_rate().is_none());
        assert!(snapshot.failure_reason().is_none());
    }

    #[test]
    fn test_prediction_scans_forward() {
        let mut older = entry("older", 6);
        older.predicted_values = Some(vec![100.0, 102.0, 105.0]);
        older.predicted_values_start_time = Some(now() - Duration::minutes(6));

        let snapshot = StatusSnapshot::new(vec![entry("latest", 1), older]).unwrap();
        assert_eq!(snapshot.predicted_values(), Some(&[100.0, 102.0, 105.0][..]));
        assert_eq!(
            snapshot.predicted_values_start_time(),
            Some(now() - Duration::minutes(6))
        );
    }

    #[test]
    fn test_predicted_readings_series() {
        let t = now();
        let mut e = entry("a", 0);
        e.predicted_values = Some(vec![100.0, 102.0, 105.0]);
        e.predicted_values_start_time = Some(t);
        let snapshot = StatusSnapshot::new(vec![e]).unwrap();

        let readings: Vec<_> = snapshot.predicted_readings().collect();
        assert_eq!(
            readings,
            vec![
                PredictedReading { value: 100.0, at: t },
                PredictedReading { value: 102.0, at: t + Duration::minutes(5) },
                PredictedReading { value: 105.0, at: t + Duration::minutes(10) },
            ]
        );

        // restartable: a second pass and a cloned iterator see the same series
        let iter = snapshot.predicted_readings();
        assert_eq!(iter.len(), 3);
        assert_eq!(iter.clone().collect::<Vec<_>>(), readings);
        assert_eq!(snapshot.predicted_readings().collect::<Vec<_>>(), readings);
    }

    #[test]
    fn test_no_prediction_yields_empty_series() {
        let snapshot = StatusSnapshot::new(vec![entry("a", 0)]).unwrap();
        assert!(snapshot.predicted_values().is_none());
        assert_eq!(snapshot.predicted_readings().count(), 0);
    }

    #[test]
    fn test_enacted_basal_skips_expired_windows() {
        let mut a = entry("a", 0);
        a.enacted_basal = Some(basal(1.5, 10, 5.0));
        let mut b = entry("b", 2);
        b.enacted_basal = Some(basal(0.4, 2, 30.0));

        let snapshot = StatusSnapshot::new(vec![a, b]).unwrap();
        assert_eq!(snapshot.enacted_basal_rate(now()), Some(0.4));
    }

    #[test]
    fn test_enacted_basal_prefers_most_recent_active() {
        let mut a = entry("a", 0);
        a.enacted_basal = Some(basal(1.5, 1, 30.0));
        let mut b = entry("b", 5);
        b.enacted_basal = Some(basal(0.4, 5, 30.0));

        let snapshot = StatusSnapshot::new(vec![a, b]).unwrap();
        assert_eq!(snapshot.enacted_basal_rate(now()), Some(1.5));
        // once every window has closed there is no enacted basal
        assert_eq!(
            snapshot.enacted_basal_rate(now() + Duration::minutes(40)),
            None
        );
    }

    #[test]
    fn test_should_refresh_threshold() {
        let snapshot = StatusSnapshot::new(vec![entry("a", 0)]).unwrap();
        let ts = snapshot.timestamp();
        assert!(!snapshot.should_refresh(ts + Duration::seconds(269)));
        assert!(snapshot.should_refresh(ts + Duration::seconds(270)));
        assert_eq!(snapshot.freshness(ts + Duration::minutes(7)), FreshnessState::Aging);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Slack added before truncating to whole minutes, to absorb clock skew
/// between this device and the remote site.
pub const SKEW_TOLERANCE_MS: i64 = 30_000;

/// Snapshots at least this old are due for a refetch.
pub const REFRESH_AFTER_MINUTES: i64 = 5;

/// Whole minutes from `timestamp` to `now`, with the skew tolerance applied.
/// Negative when `timestamp` is more than 30 s in the future.
pub fn minutes_since(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let elapsed_ms = (now - timestamp).num_milliseconds();
    (elapsed_ms + SKEW_TOLERANCE_MS) / 60_000
}

/// How old the latest loop decision is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FreshnessState {
    Fresh,
    Aging,
    Stale,
    Unknown,
}

impl FreshnessState {
    pub fn from_minutes(minutes: i64) -> Self {
        match minutes {
            0..=5 => Self::Fresh,
            6..=15 => Self::Aging,
            16..=720 => Self::Stale,
            _ => Self::Unknown,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Aging => "aging",
            Self::Stale => "stale",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FreshnessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

pub fn classify(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> FreshnessState {
    FreshnessState::from_minutes(minutes_since(timestamp, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 6, 18, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_minutes_since_applies_tolerance() {
        let ts = t0();
        assert_eq!(minutes_since(ts, ts), 0);
        assert_eq!(minutes_since(ts, ts + Duration::seconds(29)), 0);
        assert_eq!(minutes_since(ts, ts + Duration::seconds(30)), 1);
        assert_eq!(minutes_since(ts, ts + Duration::seconds(89)), 1);
        assert_eq!(minutes_since(ts, ts + Duration::seconds(90)), 2);
    }

    #[test]
    fn test_future_timestamps() {
        let ts = t0();
        assert_eq!(minutes_since(ts, ts - Duration::seconds(20)), 0);
        assert_eq!(minutes_since(ts, ts - Duration::seconds(120)), -1);
        assert_eq!(classify(ts, ts - Duration::seconds(120)), FreshnessState::Unknown);
    }

    #[test]
    fn test_table_boundaries() {
        let cases = [
            (0, FreshnessState::Fresh),
            (5, FreshnessState::Fresh),
            (6, FreshnessState::Aging),
            (15, FreshnessState::Aging),
            (16, FreshnessState::Stale),
            (720, FreshnessState::Stale),
            (721, FreshnessState::Unknown),
        ];
        for (minutes, expected) in cases {
            assert_eq!(FreshnessState::from_minutes(minutes), expected, "{minutes} min");
            // whole minutes land on the same bucket through the clock path
            let now = t0() + Duration::minutes(minutes);
            assert_eq!(classify(t0(), now), expected, "{minutes} min via classify");
        }
    }

    #[test]
    fn test_classify_is_monotonic() {
        let rank = |s: FreshnessState| match s {
            FreshnessState::Fresh => 0,
            FreshnessState::Aging => 1,
            FreshnessState::Stale => 2,
            FreshnessState::Unknown => 3,
        };
        let mut last = 0;
        for minutes in 0..=800 {
            let r = rank(FreshnessState::from_minutes(minutes));
            assert!(r >= last, "regressed at {minutes}");
            last = r;
        }
    }
}

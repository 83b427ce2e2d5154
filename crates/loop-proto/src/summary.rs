//! Short, display-ready labels for the current loop status.

use chrono::{DateTime, Utc};
use std::fmt;

use crate::freshness::FreshnessState;
use crate::snapshot::StatusSnapshot;

/// The informational line under the status: a failure wins over
/// recommendations.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryInfo {
    Failure(String),
    RecommendedBolus(f64),
    RecommendedBasal(f64),
    None,
}

impl fmt::Display for SummaryInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failure(reason) => write!(f, "\u{274c} {}", reason),
            Self::RecommendedBolus(units) => write!(f, "REC BOLUS: {}U", units),
            Self::RecommendedBasal(rate) => write!(f, "REC BASAL: {}U", rate),
            Self::None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopSummary {
    pub minutes_ago: i64,
    pub freshness: FreshnessState,
    pub prediction: String,
    pub basal: String,
    pub cob: String,
    pub info: SummaryInfo,
}

impl LoopSummary {
    pub fn new(snapshot: &StatusSnapshot, now: DateTime<Utc>) -> Self {
        let prediction = snapshot
            .predicted_values()
            .and_then(|values| values.last())
            .map(|last| format!("{}", last.trunc() as i64))
            .unwrap_or_else(|| " - ".to_string());

        let basal = snapshot
            .enacted_basal_rate(now)
            .map(|rate| format!("{} U/h", rate))
            .unwrap_or_else(|| "schedule".to_string());

        let info = if let Some(reason) = snapshot.failure_reason() {
            SummaryInfo::Failure(reason.to_string())
        } else if let Some(bolus) = snapshot.recommended_bolus().filter(|b| *b > 0.0) {
            SummaryInfo::RecommendedBolus(round3(bolus))
        } else if let Some(rate) = snapshot.recommended_basal_rate() {
            SummaryInfo::RecommendedBasal(round3(rate))
        } else {
            SummaryInfo::None
        };

        Self {
            minutes_ago: snapshot.minutes_ago(now),
            freshness: snapshot.freshness(now),
            prediction,
            basal,
            cob: format!("{}g", snapshot.carbs_on_board()),
            info,
        }
    }

    pub fn minutes_label(&self) -> String {
        format!("{}min", self.minutes_ago)
    }
}

impl fmt::Display for LoopSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} | \u{219d} {} | BASAL {} | COB {}",
            self.freshness,
            self.minutes_label(),
            self.prediction,
            self.basal,
            self.cob
        )?;
        if self.info != SummaryInfo::None {
            write!(f, " | {}", self.info)?;
        }
        Ok(())
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

//! Builders for Nightscout device-status records as the loop uploader writes
//! them.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::{json, Value};

pub fn iso(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn iso_no_millis(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// A loop record with just an id and a timestamp.
pub fn bare(id: &str, ts: DateTime<Utc>) -> Value {
    json!({ "_id": id, "loop": { "timestamp": iso(ts) } })
}

/// A loop record as the uploader writes it after a successful cycle.
pub fn cycle(id: &str, ts: DateTime<Utc>, basal_rate: f64, predicted: &[f64]) -> Value {
    json!({
        "_id": id,
        "device": "loop://iPhone",
        "created_at": iso(ts),
        "loop": {
            "name": "Loop",
            "version": "1.9.3",
            "timestamp": iso(ts),
            "enacted": {
                "rate": basal_rate,
                "timestamp": iso_no_millis(ts),
                "duration": 30,
                "received": true
            },
            "recommendedTempBasal": { "rate": basal_rate, "duration": 30, "timestamp": iso(ts) },
            "recommendedBolus": 0,
            "predicted": { "values": predicted, "startDate": iso(ts) },
            "iob": { "iob": 1.2, "timestamp": iso(ts) },
            "cob": { "cob": 18, "timestamp": iso(ts) }
        },
        "pump": { "reservoir": 112.5, "battery": { "percent": 75 } },
        "uploader": { "battery": 80 }
    })
}

/// A record pushed by a non-loop uploader.
pub fn pump_only(id: &str) -> Value {
    json!({ "_id": id, "pump": { "reservoir": 90 } })
}

/// A loop record whose timestamp cannot be parsed.
pub fn garbled(id: &str) -> Value {
    json!({ "_id": id, "loop": { "timestamp": "Tue Jun 18 2019 10:15" } })
}

pub fn minutes_before(now: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    now - Duration::minutes(minutes)
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// a decoded sample from the pulse-oximeter node
/// not yet persisted, so it has no id or timestamp
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VitalsSample {
    /// heart rate in beats per minute
    pub bpm: f64,
    /// blood oxygen saturation (percent)
    pub spo2: f64,
}

/// a stored reading, as served by `GET /data`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// assigned by the store on insert, strictly increasing
    pub id: i64,

    /// heart rate in beats per minute
    pub bpm: f64,

    /// blood oxygen saturation (percent)
    pub spo2: f64,

    /// host clock at insert time (not the node's clock)
    pub timestamp: DateTime<Utc>,
}

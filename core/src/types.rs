//! Shared primitive types used across the entire simulation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One engine tick. The wall-time span of a tick is whatever `elapsed`
/// the driver passes in.
pub type Tick = u64;

/// Stable identifier of a single simulated companion.
pub type CompanionId = String;

/// A point on the simulated timeline.
pub type Instant = DateTime<Utc>;

/// Stat name → signed delta.
pub type Effects = BTreeMap<String, f64>;

/// Stat name → minimum value that must be reached.
pub type StatMinimums = BTreeMap<String, f64>;

/// Inclusive bounds on a stat. A missing bound is not checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl StatRange {
    pub fn at_least(min: f64) -> Self {
        Self { min: Some(min), max: None }
    }

    pub fn at_most(max: f64) -> Self {
        Self { min: None, max: Some(max) }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |m| value >= m) && self.max.map_or(true, |m| value <= m)
    }
}

/// Serde helper: `chrono::Duration` as whole milliseconds.
///
/// Keeps second-granularity durations exact across save/load.
pub mod duration_millis {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = i64::deserialize(d)?;
        Ok(Duration::milliseconds(ms))
    }
}

/// Seconds from configuration files → `chrono::Duration`.
pub fn secs(seconds: u64) -> chrono::Duration {
    chrono::Duration::seconds(seconds.min(i64::MAX as u64) as i64)
}

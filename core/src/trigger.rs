//! Shared trigger plumbing: per-name cooldowns and condition checks.
//!
//! Used by the random/romance event engines and the jealousy engine.

use crate::{
    config::{EventConditions, INTERACTION_COUNT_KEY, MEMORY_COUNT_KEY},
    history::HistoryReader,
    stats::StatReader,
    types::Instant,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Window for `memoryCount.recent_positive_min`.
pub const RECENT_MEMORY_WINDOW_HOURS: i64 = 24;

/// Last firing time per trigger name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CooldownTracker {
    last_fired: BTreeMap<String, Instant>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `name` never fired, or fired at least `cooldown` ago.
    pub fn is_ready(&self, name: &str, cooldown: Duration, now: Instant) -> bool {
        self.last_fired
            .get(name)
            .map_or(true, |last| now - *last >= cooldown)
    }

    pub fn mark(&mut self, name: &str, now: Instant) {
        self.last_fired.insert(name.to_string(), now);
    }

    pub fn last_fired(&self, name: &str) -> Option<Instant> {
        self.last_fired.get(name).copied()
    }

    pub fn clear(&mut self) {
        self.last_fired.clear();
    }
}

/// Evaluate event conditions. An empty map always holds.
pub fn conditions_met<S: StatReader + ?Sized>(
    conditions: &EventConditions,
    stats: &S,
    history: &dyn HistoryReader,
    now: Instant,
) -> bool {
    conditions.iter().all(|(key, bounds)| match key.as_str() {
        INTERACTION_COUNT_KEY => interaction_counts_met(bounds, history),
        MEMORY_COUNT_KEY => memory_counts_met(bounds, history, now),
        stat => {
            let value = stats.get_stat(stat);
            bounds.get("min").map_or(true, |min| value >= *min)
                && bounds.get("max").map_or(true, |max| value <= *max)
        }
    })
}

fn interaction_counts_met(bounds: &BTreeMap<String, f64>, history: &dyn HistoryReader) -> bool {
    bounds.iter().all(|(key, required)| {
        let count = if key == "total_min" {
            history.total_interactions()
        } else if let Some(kind) = key.strip_suffix("_min") {
            history.interaction_count(kind)
        } else {
            return true;
        };
        count as f64 >= *required
    })
}

fn memory_counts_met(
    bounds: &BTreeMap<String, f64>,
    history: &dyn HistoryReader,
    now: Instant,
) -> bool {
    bounds.iter().all(|(key, required)| {
        let count = match key.as_str() {
            "total_min" => history.memory_count(),
            "recent_positive_min" => history
                .recent_positive_memories(Duration::hours(RECENT_MEMORY_WINDOW_HOURS), now),
            _ => return true,
        };
        count as f64 >= *required
    })
}

//! The stat store, the single source of truth for every numeric stat.
//!
//! RULE: `0 <= current <= max` holds after every mutation.
//! RULE: Other components never hold stat values across calls. They read
//! through `StatReader`, write through `StatWriter`, and every call takes
//! and releases the store's lock on its own.

use crate::{
    config::StatConfig,
    error::{SimError, SimResult},
    types::{Effects, StatMinimums, StatRange},
};
use log::warn;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Single drops larger than this fraction of max are logged.
const LARGE_DROP_FRACTION: f64 = 0.25;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Stat {
    pub current:            f64,
    pub max:                f64,
    pub degradation_rate:   f64,
    pub critical_threshold: f64,
}

impl Stat {
    pub fn from_config(cfg: &StatConfig) -> Self {
        Self {
            current:            cfg.initial.clamp(0.0, cfg.max),
            max:                cfg.max,
            degradation_rate:   cfg.degradation_rate,
            critical_threshold: cfg.critical_threshold,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.current <= self.critical_threshold
    }

    fn percentage(&self) -> f64 {
        if self.max <= 0.0 {
            0.0
        } else {
            self.current / self.max * 100.0
        }
    }
}

/// Read contract shared by every component.
pub trait StatReader: Send + Sync {
    /// Current value, 0 when the stat does not exist.
    fn get_stat(&self, name: &str) -> f64;

    /// Copy of every current value.
    fn get_stats(&self) -> BTreeMap<String, f64>;

    /// Max value, 0 when the stat does not exist.
    fn stat_max(&self, name: &str) -> f64;

    /// True only if every named stat exists and is at or above its minimum.
    fn can_satisfy_requirements(&self, conditions: &StatMinimums) -> bool;

    /// True only if every named stat exists and lies within its range.
    fn can_satisfy_ranges(&self, ranges: &BTreeMap<String, StatRange>) -> bool;
}

/// Mutation contract. Each call is atomic with respect to other callers.
pub trait StatWriter: StatReader {
    /// Add each delta and clamp to `[0, max]`. Unknown names are ignored.
    fn apply_effects(&self, effects: &Effects);

    /// Permanently raise both max and current by `boost`.
    fn boost_stat(&self, name: &str, boost: f64);
}

/// Result of one degradation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DegradeOutcome {
    /// Stats that fell to or below their critical threshold this pass.
    pub newly_critical: Vec<String>,
    /// Mood names for every stat currently critical (e.g. "hungry").
    pub mood_states:    Vec<String>,
}

#[derive(Debug, Default)]
pub struct StatStore {
    stats: RwLock<BTreeMap<String, Stat>>,
}

impl StatStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(configs: &BTreeMap<String, StatConfig>) -> Self {
        let stats = configs
            .iter()
            .map(|(name, cfg)| (name.clone(), Stat::from_config(cfg)))
            .collect();
        Self { stats: RwLock::new(stats) }
    }

    /// Overwrite a stat's current value, clamped.
    pub fn set_stat(&self, name: &str, value: f64) {
        if let Some(stat) = self.stats.write().get_mut(name) {
            stat.current = value.clamp(0.0, stat.max);
        }
    }

    /// Apply `rate × minutes` decay to every stat with a positive rate.
    pub fn degrade(&self, minutes: f64) -> DegradeOutcome {
        let mut outcome = DegradeOutcome::default();
        if minutes <= 0.0 {
            return outcome;
        }
        let mut stats = self.stats.write();
        for (name, stat) in stats.iter_mut() {
            if stat.degradation_rate <= 0.0 {
                continue;
            }
            let was_critical = stat.is_critical();
            stat.current = (stat.current - stat.degradation_rate * minutes).max(0.0);
            if !was_critical && stat.is_critical() {
                outcome.newly_critical.push(name.clone());
            }
        }
        outcome.mood_states = mood_states(&stats);
        outcome
    }

    /// Names of every stat at or below its critical threshold.
    pub fn critical_states(&self) -> Vec<String> {
        self.stats
            .read()
            .iter()
            .filter(|(_, s)| s.is_critical())
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Current as a percentage of max. 0 if absent or max is 0.
    pub fn stat_percentage(&self, name: &str) -> f64 {
        self.stats.read().get(name).map_or(0.0, Stat::percentage)
    }

    /// Mean percentage across all stats. 50 with no stats.
    pub fn overall_mood(&self) -> f64 {
        let stats = self.stats.read();
        if stats.is_empty() {
            return 50.0;
        }
        stats.values().map(Stat::percentage).sum::<f64>() / stats.len() as f64
    }

    pub fn mood_category(&self) -> &'static str {
        match self.overall_mood() {
            m if m >= 80.0 => "happy",
            m if m >= 60.0 => "content",
            m if m >= 40.0 => "neutral",
            m if m >= 20.0 => "sad",
            _ => "depressed",
        }
    }

    /// Full copy including max and decay settings, for snapshots.
    pub fn snapshot_full(&self) -> BTreeMap<String, Stat> {
        self.stats.read().clone()
    }

    /// Check a saved stat set without touching live state.
    pub fn check_saved(stats: &BTreeMap<String, Stat>) -> SimResult<()> {
        validate_stats(stats)
    }

    /// Replace every stat after validating the incoming set.
    pub fn restore(&self, stats: BTreeMap<String, Stat>) -> SimResult<()> {
        validate_stats(&stats)?;
        *self.stats.write() = stats;
        Ok(())
    }

    pub fn validate(&self) -> SimResult<()> {
        validate_stats(&self.stats.read())
    }

    pub fn len(&self) -> usize {
        self.stats.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.read().is_empty()
    }
}

impl StatReader for StatStore {
    fn get_stat(&self, name: &str) -> f64 {
        self.stats.read().get(name).map_or(0.0, |s| s.current)
    }

    fn get_stats(&self) -> BTreeMap<String, f64> {
        self.stats
            .read()
            .iter()
            .map(|(n, s)| (n.clone(), s.current))
            .collect()
    }

    fn stat_max(&self, name: &str) -> f64 {
        self.stats.read().get(name).map_or(0.0, |s| s.max)
    }

    fn can_satisfy_requirements(&self, conditions: &StatMinimums) -> bool {
        let stats = self.stats.read();
        conditions
            .iter()
            .all(|(name, min)| stats.get(name).map_or(false, |s| s.current >= *min))
    }

    fn can_satisfy_ranges(&self, ranges: &BTreeMap<String, StatRange>) -> bool {
        let stats = self.stats.read();
        ranges
            .iter()
            .all(|(name, range)| stats.get(name).map_or(false, |s| range.contains(s.current)))
    }
}

impl StatWriter for StatStore {
    fn apply_effects(&self, effects: &Effects) {
        let mut stats = self.stats.write();
        for (name, delta) in effects {
            let Some(stat) = stats.get_mut(name) else { continue };
            let before = stat.current;
            stat.current = (stat.current + delta).clamp(0.0, stat.max);
            if before - stat.current > stat.max * LARGE_DROP_FRACTION {
                warn!("stat '{name}' dropped {:.1} -> {:.1}", before, stat.current);
            }
        }
    }

    fn boost_stat(&self, name: &str, boost: f64) {
        if let Some(stat) = self.stats.write().get_mut(name) {
            stat.max = (stat.max + boost).max(0.0);
            stat.current = (stat.current + boost).clamp(0.0, stat.max);
        }
    }
}

/// Mood shown while `stat` is critical, if it has one.
pub fn mood_state(stat: &str) -> Option<&'static str> {
    match stat {
        "hunger" => Some("hungry"),
        "happiness" => Some("sad"),
        "health" => Some("sick"),
        "energy" => Some("tired"),
        _ => None,
    }
}

fn mood_states(stats: &BTreeMap<String, Stat>) -> Vec<String> {
    stats
        .iter()
        .filter(|(_, s)| s.is_critical())
        .filter_map(|(name, _)| mood_state(name))
        .map(str::to_string)
        .collect()
}

fn validate_stats(stats: &BTreeMap<String, Stat>) -> SimResult<()> {
    for (name, s) in stats {
        let reason = if s.max <= 0.0 {
            Some(format!("max value must be positive, got {}", s.max))
        } else if !(0.0..=s.max).contains(&s.current) {
            Some(format!("current {} outside [0, {}]", s.current, s.max))
        } else if s.degradation_rate < 0.0 {
            Some(format!("degradation rate cannot be negative, got {}", s.degradation_rate))
        } else if !(0.0..=s.max).contains(&s.critical_threshold) {
            Some(format!("critical threshold {} outside [0, {}]", s.critical_threshold, s.max))
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(SimError::invalid("stats", format!("stat '{name}': {reason}")));
        }
    }
    Ok(())
}

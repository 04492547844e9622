//! Snapshot serialization: full companion state to/from JSON.
//!
//! A snapshot is taken every SNAPSHOT_INTERVAL ticks when a store is
//! attached, and on demand. It captures everything needed to resume the
//! companion without replaying its event log.
//!
//! RULE: Durations are stored as integer milliseconds and maps are
//! ordered, so save → load → save is byte-identical.

use crate::{
    clock::CompanionClock,
    crisis::Crisis,
    error::SimResult,
    history::HistorySnapshot,
    progression::ProgressionState,
    stats::Stat,
    types::{CompanionId, Instant, Tick},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SNAPSHOT_INTERVAL: Tick = 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompanionSnapshot {
    pub companion_id:     CompanionId,
    pub tick:             Tick,
    pub clock:            CompanionClock,
    pub stats:            BTreeMap<String, Stat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progression:      Option<ProgressionState>,
    pub history:          HistorySnapshot,
    #[serde(default)]
    pub active_crises:    Vec<Crisis>,
    pub last_interaction: Instant,
}

impl CompanionSnapshot {
    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

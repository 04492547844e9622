//! Interaction history: what the player did and when.
//!
//! RULE: Only the interaction handler appends. Analysis components read
//! through `HistoryReader` and only ever see copies.

use crate::types::Instant;
use chrono::Duration;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Per-type timestamp cap. Oldest entries are evicted first.
pub const MAX_RECORDS_PER_TYPE: usize = 50;
/// Romance memory cap.
pub const MAX_MEMORIES: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RomanceMemory {
    pub timestamp:        Instant,
    pub interaction_type: String,
    pub stats_before:     BTreeMap<String, f64>,
    pub stats_after:      BTreeMap<String, f64>,
    pub response:         String,
}

impl RomanceMemory {
    pub fn affection_gained(&self) -> bool {
        let before = self.stats_before.get("affection").copied().unwrap_or(0.0);
        let after = self.stats_after.get("affection").copied().unwrap_or(0.0);
        after > before
    }
}

/// Read contract for everything that analyses player behaviour.
pub trait HistoryReader: Send + Sync {
    /// Copy of every per-type timestamp sequence, oldest first.
    fn interaction_history(&self) -> BTreeMap<String, Vec<Instant>>;

    /// Interactions of `interaction_type` at or after `since`.
    fn count_since(&self, interaction_type: &str, since: Instant) -> usize;

    /// Retained records of one type.
    fn interaction_count(&self, interaction_type: &str) -> usize;

    /// Retained records across all types.
    fn total_interactions(&self) -> usize;

    fn memory_count(&self) -> usize;

    /// Memories inside `window` before `now` where affection went up.
    fn recent_positive_memories(&self, window: Duration, now: Instant) -> usize;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistorySnapshot {
    pub interactions: BTreeMap<String, Vec<Instant>>,
    pub memories:     Vec<RomanceMemory>,
}

#[derive(Debug, Default)]
struct LogState {
    by_type:  BTreeMap<String, VecDeque<Instant>>,
    memories: VecDeque<RomanceMemory>,
}

#[derive(Debug, Default)]
pub struct InteractionLog {
    state: RwLock<LogState>,
}

impl InteractionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, interaction_type: &str, at: Instant) {
        let mut state = self.state.write();
        let records = state.by_type.entry(interaction_type.to_string()).or_default();
        records.push_back(at);
        while records.len() > MAX_RECORDS_PER_TYPE {
            records.pop_front();
        }
    }

    pub fn record_memory(&self, memory: RomanceMemory) {
        let mut state = self.state.write();
        state.memories.push_back(memory);
        while state.memories.len() > MAX_MEMORIES {
            state.memories.pop_front();
        }
    }

    pub fn memories(&self) -> Vec<RomanceMemory> {
        self.state.read().memories.iter().cloned().collect()
    }

    pub fn snapshot(&self) -> HistorySnapshot {
        let state = self.state.read();
        HistorySnapshot {
            interactions: state
                .by_type
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().copied().collect()))
                .collect(),
            memories: state.memories.iter().cloned().collect(),
        }
    }

    /// Replace all history. Caps are re-applied to the incoming data.
    pub fn restore(&self, snapshot: HistorySnapshot) {
        let mut state = self.state.write();
        state.by_type = snapshot
            .interactions
            .into_iter()
            .map(|(k, v)| {
                let skip = v.len().saturating_sub(MAX_RECORDS_PER_TYPE);
                (k, v.into_iter().skip(skip).collect())
            })
            .collect();
        let skip = snapshot.memories.len().saturating_sub(MAX_MEMORIES);
        state.memories = snapshot.memories.into_iter().skip(skip).collect();
    }
}

impl HistoryReader for InteractionLog {
    fn interaction_history(&self) -> BTreeMap<String, Vec<Instant>> {
        self.snapshot().interactions
    }

    fn count_since(&self, interaction_type: &str, since: Instant) -> usize {
        self.state
            .read()
            .by_type
            .get(interaction_type)
            .map_or(0, |r| r.iter().filter(|t| **t >= since).count())
    }

    fn interaction_count(&self, interaction_type: &str) -> usize {
        self.state.read().by_type.get(interaction_type).map_or(0, VecDeque::len)
    }

    fn total_interactions(&self) -> usize {
        self.state.read().by_type.values().map(VecDeque::len).sum()
    }

    fn memory_count(&self) -> usize {
        self.state.read().memories.len()
    }

    fn recent_positive_memories(&self, window: Duration, now: Instant) -> usize {
        let cutoff = now - window;
        self.state
            .read()
            .memories
            .iter()
            .filter(|m| m.timestamp >= cutoff && m.affection_gained())
            .count()
    }
}

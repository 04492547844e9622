//! The event bus: everything a tick produces for the host.
//!
//! RULE: Subsystems report what happened ONLY through events.
//! The host's animation/dialog layer renders them; the save store logs them.
//! Stat effects carried by an event have ALREADY been applied by the
//! subsystem that emitted it. Hosts must not re-apply them.

use crate::{
    progression::AchievementDetails,
    types::{duration_millis, CompanionId, Effects, Tick},
};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// A displayable event handed to the animation/dialog layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggeredEvent {
    pub name:        String,
    pub description: String,
    pub effects:     Effects,
    pub animations:  Vec<String>,
    pub responses:   Vec<String>,
    /// How long the host should keep the event on screen.
    #[serde(with = "duration_millis")]
    pub duration:    Duration,
}

impl TriggeredEvent {
    pub fn has_responses(&self) -> bool {
        !self.responses.is_empty()
    }
}

/// Which subsystem produced a `TriggeredEvent`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    RandomEvent,
    RomanceEvent,
    Jealousy,
    CrisisOnset,
    CrisisOngoing,
    CrisisRecovery,
}

/// Every event emitted during simulation.
/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompanionEvent {
    // ── Engine events ──────────────────────────────
    TickStarted {
        tick: Tick,
    },
    TickCompleted {
        tick: Tick,
    },
    RunInitialized {
        companion_id: CompanionId,
        seed: u64,
    },

    // ── Stat events ────────────────────────────────
    StatCritical {
        tick: Tick,
        stat: String,
        value: f64,
        /// Mood state for the animation layer (e.g. "hungry"), if any.
        mood_state: Option<String>,
    },

    // ── Displayable events ─────────────────────────
    Triggered {
        tick: Tick,
        source: EventSource,
        event: TriggeredEvent,
    },

    // ── Crisis lifecycle ───────────────────────────
    CrisisOpened {
        tick: Tick,
        name: String,
        severity: f64,
        cause: String,
    },
    CrisisResolved {
        tick: Tick,
        name: String,
    },

    // ── Compatibility ──────────────────────────────
    ModifierAdded {
        tick: Tick,
        stat_name: String,
        value: f64,
        reason: String,
    },
    ModifierExpired {
        tick: Tick,
        stat_name: String,
    },

    // ── Progression ────────────────────────────────
    LevelChanged {
        tick: Tick,
        from: String,
        to: String,
    },
    AchievementEarned {
        tick: Tick,
        details: AchievementDetails,
    },

    // ── Player interactions ────────────────────────
    InteractionPerformed {
        tick: Tick,
        interaction_type: String,
        effects: Effects,
    },
    InteractionRejected {
        tick: Tick,
        interaction_type: String,
        reason: String,
    },
}

impl CompanionEvent {
    /// Stable string name, used for the event_type column in event_log.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::TickStarted { .. }          => "tick_started",
            Self::TickCompleted { .. }        => "tick_completed",
            Self::RunInitialized { .. }       => "run_initialized",
            Self::StatCritical { .. }         => "stat_critical",
            Self::Triggered { .. }            => "triggered",
            Self::CrisisOpened { .. }         => "crisis_opened",
            Self::CrisisResolved { .. }       => "crisis_resolved",
            Self::ModifierAdded { .. }        => "modifier_added",
            Self::ModifierExpired { .. }      => "modifier_expired",
            Self::LevelChanged { .. }         => "level_changed",
            Self::AchievementEarned { .. }    => "achievement_earned",
            Self::InteractionPerformed { .. } => "interaction_performed",
            Self::InteractionRejected { .. }  => "interaction_rejected",
        }
    }

    /// The displayable payload, if this event carries one.
    pub fn triggered(&self) -> Option<&TriggeredEvent> {
        match self {
            Self::Triggered { event, .. } => Some(event),
            _ => None,
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub companion_id: CompanionId,
    pub tick: Tick,
    pub subsystem: String,
    pub event_type: String,
    pub payload: String, // JSON-serialized CompanionEvent
}

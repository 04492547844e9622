//! Crisis/recovery state machine.
//!
//! Per crisis name: none → active → resolved. A resolved crisis may
//! reopen later as a fresh instance.
//!
//! Detection (once per check interval): the first configured definition
//! whose stat is past its threshold, with no active crisis of that name
//! and fewer than `max_active` open, opens a crisis. Severity is
//! `min(1, |value − threshold| / scale)`.
//!
//! Every tick: each active crisis applies its severity-scaled penalties,
//! and with a small chance the most severe one surfaces an ongoing event.
//!
//! Recovery is driven by the interaction handler through
//! `check_recovery`. It needs ALL of: the time requirement elapsed, the
//! required stat bounds met, and the required interactions performed
//! since the crisis began.

use crate::{
    config::{CrisisConfig, CrisisDefinition},
    error::SimResult,
    event::{CompanionEvent, EventSource, TriggeredEvent},
    history::HistoryReader,
    rng::RandomSource,
    stats::{StatReader, StatWriter},
    subsystem::{CompanionSubsystem, TickContext},
    types::{secs, Effects, Instant},
};
use chrono::Duration;
use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A crisis opened exactly at its threshold still has some bite.
pub const MIN_SEVERITY: f64 = 0.05;
const ONSET_EVENT_SECS: u64 = 5;
const ONGOING_EVENT_SECS: u64 = 3;
const RECOVERY_EVENT_SECS: u64 = 8;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Crisis {
    pub name:           String,
    pub description:    String,
    pub triggered_at:   Instant,
    /// In (0, 1].
    pub severity:       f64,
    pub trigger_cause:  String,
    /// Per-tick penalties, already scaled by severity.
    pub stat_penalties: Effects,
    pub is_active:      bool,
}

impl Crisis {
    fn open(def: &CrisisDefinition, value: f64, now: Instant) -> Self {
        let severity = ((value - def.threshold).abs() / def.severity_scale).clamp(MIN_SEVERITY, 1.0);
        Self {
            name:           def.name.clone(),
            description:    def.description.clone(),
            triggered_at:   now,
            severity,
            trigger_cause:  def.trigger_cause.clone(),
            stat_penalties: def
                .penalties
                .iter()
                .map(|(stat, p)| (stat.clone(), p * severity))
                .collect(),
            is_active:      true,
        }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now - self.triggered_at
    }
}

/// Everything one crisis tick produced.
#[derive(Debug, Clone, Default)]
pub struct CrisisTick {
    pub opened:  Option<(Crisis, TriggeredEvent)>,
    pub ongoing: Option<TriggeredEvent>,
}

/// A successful recovery.
#[derive(Debug, Clone)]
pub struct Recovery {
    pub crisis: Crisis,
    pub event:  TriggeredEvent,
}

#[derive(Debug, Default)]
struct CrisisState {
    active:         Vec<Crisis>,
    last_check:     Option<Instant>,
    recovery_bonus: f64,
    resolved_total: u32,
}

pub struct CrisisManager {
    config:  CrisisConfig,
    state:   RwLock<CrisisState>,
    enabled: AtomicBool,
}

impl CrisisManager {
    pub fn new(config: CrisisConfig) -> Self {
        let state = CrisisState {
            recovery_bonus: config.recovery_bonus.max(1.0),
            ..CrisisState::default()
        };
        let enabled = config.enabled;
        Self {
            config,
            state: RwLock::new(state),
            enabled: AtomicBool::new(enabled),
        }
    }

    fn definition(&self, name: &str) -> Option<&CrisisDefinition> {
        self.config.definitions.iter().find(|d| d.name == name)
    }

    /// Detection (if due), ongoing penalties and the ongoing-event roll.
    pub fn tick<S: StatWriter + ?Sized>(
        &self,
        now: Instant,
        stats: &S,
        rng: &mut dyn RandomSource,
    ) -> CrisisTick {
        let mut out = CrisisTick::default();
        if !self.is_enabled() {
            return out;
        }

        let due = self.state.read().last_check.map_or(true, |last| {
            now - last >= secs(self.config.check_interval_secs)
        });
        let values = due.then(|| stats.get_stats());

        let penalties = {
            let mut state = self.state.write();
            if let Some(values) = values {
                state.last_check = Some(now);
                if let Some(crisis) = self.detect(&state.active, &values, now) {
                    info!(
                        "crisis '{}' opened, severity {:.2} ({})",
                        crisis.name, crisis.severity, crisis.trigger_cause
                    );
                    state.active.push(crisis.clone());
                    let event = self.onset_event(&crisis);
                    out.opened = Some((crisis, event));
                }
            }
            let mut total = Effects::new();
            for crisis in state.active.iter().filter(|c| c.is_active) {
                for (stat, p) in &crisis.stat_penalties {
                    *total.entry(stat.clone()).or_default() += p;
                }
            }
            total
        };

        if !penalties.is_empty() {
            stats.apply_effects(&penalties);
        }

        if out.opened.is_none() && rng.roll(self.config.ongoing_event_chance) {
            out.ongoing = self.ongoing_event();
        }
        out
    }

    fn detect(
        &self,
        active: &[Crisis],
        values: &BTreeMap<String, f64>,
        now: Instant,
    ) -> Option<Crisis> {
        if active.len() >= self.config.max_active {
            return None;
        }
        self.config.definitions.iter().find_map(|def| {
            let value = *values.get(&def.stat)?;
            let already_open = active.iter().any(|c| c.name == def.name);
            (!already_open && def.is_breached(value)).then(|| Crisis::open(def, value, now))
        })
    }

    fn onset_event(&self, crisis: &Crisis) -> TriggeredEvent {
        let (responses, animations) = self
            .definition(&crisis.name)
            .map(|d| (d.onset_responses.clone(), d.onset_animations.clone()))
            .unwrap_or_default();
        TriggeredEvent {
            name:        crisis.name.clone(),
            description: crisis.description.clone(),
            effects:     crisis.stat_penalties.clone(),
            animations,
            responses,
            duration:    secs(ONSET_EVENT_SECS),
        }
    }

    fn ongoing_event(&self) -> Option<TriggeredEvent> {
        let worst = {
            let state = self.state.read();
            state
                .active
                .iter()
                .filter(|c| c.is_active)
                .fold(None::<&Crisis>, |best, c| match best {
                    Some(b) if b.severity >= c.severity => Some(b),
                    _ => Some(c),
                })
                .map(|c| c.name.clone())
        }?;
        let def = self.definition(&worst);
        Some(TriggeredEvent {
            name:        format!("{worst}_ongoing"),
            description: "Ongoing crisis effects".into(),
            effects:     Effects::new(),
            animations:  def.map(|d| d.ongoing_animations.clone()).unwrap_or_default(),
            responses:   def.map(|d| d.ongoing_responses.clone()).unwrap_or_default(),
            duration:    secs(ONGOING_EVENT_SECS),
        })
    }

    /// Try to resolve one active crisis after a player interaction.
    /// At most one crisis resolves per call.
    pub fn check_recovery<S, H>(
        &self,
        now: Instant,
        stats: &S,
        history: &H,
        interaction_type: &str,
    ) -> Option<Recovery>
    where
        S: StatWriter + ?Sized,
        H: HistoryReader + ?Sized,
    {
        if !self.is_enabled() {
            return None;
        }
        let candidates: Vec<Crisis> = self.state.read().active.clone();
        let crisis = candidates
            .into_iter()
            .find(|c| c.is_active && self.can_recover(c, now, stats, history))?;

        let multiplier = {
            let mut state = self.state.write();
            let before = state.active.len();
            state.active.retain(|c| c.name != crisis.name);
            if state.active.len() == before {
                return None;
            }
            state.resolved_total += 1;
            state.recovery_bonus
        };

        let def = self.definition(&crisis.name)?;
        let bonuses: Effects = def
            .recovery
            .stat_bonuses
            .iter()
            .map(|(stat, b)| (stat.clone(), b * multiplier))
            .collect();
        stats.apply_effects(&bonuses);
        info!(
            "crisis '{}' resolved after '{}' ({} min)",
            crisis.name,
            interaction_type,
            crisis.age(now).num_minutes()
        );

        let event = TriggeredEvent {
            name:        format!("{}_recovered", crisis.name),
            description: "Crisis resolved through player care".into(),
            effects:     bonuses,
            animations:  def.recovery.recovery_animations.clone(),
            responses:   def.recovery.forgiveness_responses.clone(),
            duration:    secs(RECOVERY_EVENT_SECS),
        };
        Some(Recovery {
            crisis: Crisis { is_active: false, ..crisis },
            event,
        })
    }

    fn can_recover<S, H>(&self, crisis: &Crisis, now: Instant, stats: &S, history: &H) -> bool
    where
        S: StatReader + ?Sized,
        H: HistoryReader + ?Sized,
    {
        let Some(def) = self.definition(&crisis.name) else {
            return false;
        };
        let recovery = &def.recovery;
        if crisis.age(now) < secs(recovery.time_requirement_secs) {
            debug!("crisis '{}' not old enough to recover", crisis.name);
            return false;
        }
        if !stats.can_satisfy_ranges(&recovery.required_stats) {
            return false;
        }
        recovery.required_interactions.iter().all(|(kind, needed)| {
            history.count_since(kind, crisis.triggered_at) >= *needed as usize
        })
    }

    pub fn get_active_crises(&self) -> Vec<Crisis> {
        self.state
            .read()
            .active
            .iter()
            .filter(|c| c.is_active)
            .cloned()
            .collect()
    }

    pub fn has_crisis(&self, name: &str) -> bool {
        self.state.read().active.iter().any(|c| c.name == name)
    }

    pub fn recovery_bonus(&self) -> f64 {
        self.state.read().recovery_bonus
    }

    /// Never below 1.0.
    pub fn set_recovery_bonus(&self, bonus: f64) {
        self.state.write().recovery_bonus = bonus.max(1.0);
    }

    /// Reinstate crises from a save.
    pub fn restore_active(&self, crises: Vec<Crisis>) {
        self.state.write().active = crises.into_iter().filter(|c| c.is_active).collect();
    }

    pub fn get_crisis_status(&self, now: Instant) -> BTreeMap<String, Value> {
        let state = self.state.read();
        let thresholds: BTreeMap<&str, f64> = self
            .config
            .definitions
            .iter()
            .map(|d| (d.stat.as_str(), d.threshold))
            .collect();
        let details: Vec<Value> = state
            .active
            .iter()
            .filter(|c| c.is_active)
            .map(|c| {
                json!({
                    "name": c.name,
                    "severity": c.severity,
                    "triggeredAt": c.triggered_at.to_rfc3339(),
                    "durationSecs": c.age(now).num_seconds(),
                    "cause": c.trigger_cause,
                })
            })
            .collect();

        let mut status = BTreeMap::new();
        status.insert("enabled".into(), json!(self.is_enabled()));
        status.insert("activeCrises".into(), json!(details.len()));
        status.insert("maxCrises".into(), json!(self.config.max_active));
        status.insert("thresholds".into(), json!(thresholds));
        status.insert("recoveryBonus".into(), json!(state.recovery_bonus));
        status.insert("resolvedTotal".into(), json!(state.resolved_total));
        status.insert("lastCheck".into(), json!(state.last_check.map(|t| t.to_rfc3339())));
        status.insert("checkIntervalSecs".into(), json!(self.config.check_interval_secs));
        status.insert("crisisDetails".into(), Value::Array(details));
        status
    }
}

impl CompanionSubsystem for CrisisManager {
    fn name(&self) -> &'static str {
        "crisis"
    }

    fn update(
        &self,
        ctx: &TickContext<'_>,
        rng: &mut dyn RandomSource,
    ) -> SimResult<Vec<CompanionEvent>> {
        let out = self.tick(ctx.now, ctx.stats, rng);
        let mut events = Vec::new();
        if let Some((crisis, event)) = out.opened {
            events.push(CompanionEvent::CrisisOpened {
                tick: ctx.tick,
                name: crisis.name,
                severity: crisis.severity,
                cause: crisis.trigger_cause,
            });
            events.push(CompanionEvent::Triggered {
                tick: ctx.tick,
                source: EventSource::CrisisOnset,
                event,
            });
        }
        if let Some(event) = out.ongoing {
            events.push(CompanionEvent::Triggered {
                tick: ctx.tick,
                source: EventSource::CrisisOngoing,
                event,
            });
        }
        Ok(events)
    }

    /// Active crises are restored by `restore_active`.
    fn reset(&self, _now: Instant) {
        self.state.write().last_check = None;
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

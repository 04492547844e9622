//! Random event engine: periodic probabilistic triggers.
//!
//! One instance runs the general event list, a second the romance list.
//!
//! Per check (at most once per check interval):
//!   1. Walk the triggers in declaration order
//!   2. Skip any still cooling down or whose conditions fail
//!   3. Roll the trigger's probability
//!   4. The first trigger that fires wins; the rest wait for the next check
//!
//! RULE: The engine lock is never held while the stat store or history
//! is being read.

use crate::{
    config::RandomEventConfig,
    error::SimResult,
    event::{CompanionEvent, EventSource, TriggeredEvent},
    history::HistoryReader,
    rng::RandomSource,
    stats::StatWriter,
    subsystem::{CompanionSubsystem, TickContext},
    trigger::{conditions_met, CooldownTracker},
    types::{secs, Instant},
};
use chrono::Duration;
use log::debug;
use parking_lot::RwLock;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct EngineState {
    last_check: Option<Instant>,
    cooldowns:  CooldownTracker,
    fired:      BTreeMap<String, u32>,
}

pub struct RandomEventEngine {
    name:           &'static str,
    source:         EventSource,
    events:         Vec<RandomEventConfig>,
    check_interval: Duration,
    state:          RwLock<EngineState>,
    enabled:        AtomicBool,
}

impl RandomEventEngine {
    pub fn random(events: Vec<RandomEventConfig>, check_interval: Duration) -> Self {
        Self::with_source("random_events", EventSource::RandomEvent, events, check_interval)
    }

    pub fn romance(events: Vec<RandomEventConfig>, check_interval: Duration) -> Self {
        Self::with_source("romance_events", EventSource::RomanceEvent, events, check_interval)
    }

    fn with_source(
        name: &'static str,
        source: EventSource,
        events: Vec<RandomEventConfig>,
        check_interval: Duration,
    ) -> Self {
        let enabled = !events.is_empty();
        Self {
            name,
            source,
            events,
            check_interval,
            state: RwLock::new(EngineState::default()),
            enabled: AtomicBool::new(enabled),
        }
    }

    /// Evaluate triggers if a check is due. Effects of the fired trigger
    /// are applied before returning.
    pub fn check(
        &self,
        now: Instant,
        stats: &dyn StatWriter,
        history: &dyn HistoryReader,
        rng: &mut dyn RandomSource,
    ) -> Option<TriggeredEvent> {
        let cooldowns = {
            let state = self.state.read();
            if let Some(last) = state.last_check {
                if now - last < self.check_interval {
                    return None;
                }
            }
            state.cooldowns.clone()
        };

        let fired = self.events.iter().find(|ev| {
            cooldowns.is_ready(&ev.name, secs(ev.cooldown_secs), now)
                && conditions_met(&ev.conditions, stats, history, now)
                && rng.roll(ev.probability)
        });

        {
            let mut state = self.state.write();
            state.last_check = Some(now);
            if let Some(ev) = fired {
                state.cooldowns.mark(&ev.name, now);
                *state.fired.entry(ev.name.clone()).or_default() += 1;
            }
        }

        let ev = fired?;
        stats.apply_effects(&ev.effects);
        debug!("{}: '{}' fired", self.name, ev.name);
        Some(TriggeredEvent {
            name:        ev.name.clone(),
            description: ev.description.clone(),
            effects:     ev.effects.clone(),
            animations:  ev.animations.clone(),
            responses:   ev.responses.clone(),
            duration:    secs(ev.duration_secs),
        })
    }

    pub fn get_event_count(&self) -> usize {
        self.events.len()
    }

    pub fn last_check(&self) -> Option<Instant> {
        self.state.read().last_check
    }

    /// How many times each event has fired.
    pub fn fire_counts(&self) -> BTreeMap<String, u32> {
        self.state.read().fired.clone()
    }

    pub fn last_fired(&self, event_name: &str) -> Option<Instant> {
        self.state.read().cooldowns.last_fired(event_name)
    }
}

impl CompanionSubsystem for RandomEventEngine {
    fn name(&self) -> &'static str {
        self.name
    }

    fn update(
        &self,
        ctx: &TickContext<'_>,
        rng: &mut dyn RandomSource,
    ) -> SimResult<Vec<CompanionEvent>> {
        Ok(self
            .check(ctx.now, ctx.stats, ctx.history, rng)
            .map(|event| CompanionEvent::Triggered {
                tick: ctx.tick,
                source: self.source,
                event,
            })
            .into_iter()
            .collect())
    }

    fn reset(&self, _now: Instant) {
        let mut state = self.state.write();
        state.last_check = None;
        state.cooldowns.clear();
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled && !self.events.is_empty(), Ordering::Relaxed);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

//! Stat degradation.
//!
//! Runs once per configured decay interval and drains each stat by
//! `degradation_rate × minutes since the last pass`.

use crate::{
    error::SimResult,
    event::CompanionEvent,
    rng::RandomSource,
    stats::{mood_state, StatReader, StatStore},
    subsystem::{CompanionSubsystem, TickContext},
    types::Instant,
};
use chrono::Duration;
use log::debug;
use parking_lot::RwLock;
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct DecaySubsystem {
    store:      Arc<StatStore>,
    interval:   Duration,
    last_decay: RwLock<Instant>,
    enabled:    AtomicBool,
}

impl DecaySubsystem {
    pub fn new(store: Arc<StatStore>, interval: Duration, start: Instant) -> Self {
        Self {
            store,
            interval,
            last_decay: RwLock::new(start),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn last_decay(&self) -> Instant {
        *self.last_decay.read()
    }
}

impl CompanionSubsystem for DecaySubsystem {
    fn name(&self) -> &'static str {
        "decay"
    }

    fn update(
        &self,
        ctx: &TickContext<'_>,
        _rng: &mut dyn RandomSource,
    ) -> SimResult<Vec<CompanionEvent>> {
        let since = {
            let mut last = self.last_decay.write();
            let since = ctx.now - *last;
            if since < self.interval {
                return Ok(vec![]);
            }
            *last = ctx.now;
            since
        };

        let minutes = since.num_milliseconds() as f64 / 60_000.0;
        let outcome = self.store.degrade(minutes);
        debug!(
            "tick {}: decayed {:.2} min, mood {:.1} {:?}",
            ctx.tick,
            minutes,
            self.store.overall_mood(),
            outcome.mood_states
        );

        Ok(outcome
            .newly_critical
            .into_iter()
            .map(|stat| CompanionEvent::StatCritical {
                tick: ctx.tick,
                value: self.store.get_stat(&stat),
                mood_state: mood_state(&stat).map(str::to_string),
                stat,
            })
            .collect())
    }

    /// Decay resumes from the restored instant.
    fn reset(&self, now: Instant) {
        *self.last_decay.write() = now;
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

//! Jealousy engine: absence-driven triggers and ongoing consequences.
//!
//! Every update:
//!   1. If jealousy is at or above threshold, apply the consequence
//!      penalties scaled by intensity (0 at threshold, 1 at stat max)
//!   2. Evaluate triggers in order; the first whose gap, conditions,
//!      cooldown and probability all pass fires and raises jealousy
//!
//! Depends on: stat store (`jealousy`, `trust` and consequence stats).

use crate::{
    config::{JealousyConfig, JealousyTrigger},
    error::SimResult,
    event::{CompanionEvent, EventSource, TriggeredEvent},
    rng::RandomSource,
    stats::{StatReader, StatWriter},
    subsystem::{CompanionSubsystem, TickContext},
    trigger::CooldownTracker,
    types::{secs, Effects, Instant},
};
use chrono::Duration;
use log::debug;
use parking_lot::RwLock;
use serde_json::{json, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const JEALOUSY_STAT: &str = "jealousy";
const EVENT_DURATION_SECS: u64 = 5;

#[derive(Debug, Default)]
struct JealousyState {
    last_update: Option<Instant>,
    cooldowns:   CooldownTracker,
    fired:       u32,
}

pub struct JealousyEngine {
    config:  JealousyConfig,
    state:   RwLock<JealousyState>,
    enabled: AtomicBool,
}

impl JealousyEngine {
    pub fn new(config: JealousyConfig) -> Self {
        let enabled = config.enabled;
        Self {
            config,
            state: RwLock::new(JealousyState::default()),
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.config.threshold
    }

    pub fn triggers(&self) -> &[JealousyTrigger] {
        &self.config.triggers
    }

    /// One jealousy pass. Returns the displayable event if a trigger fired.
    pub fn evaluate<S: StatWriter + ?Sized>(
        &self,
        now: Instant,
        last_interaction: Instant,
        stats: &S,
        rng: &mut dyn RandomSource,
    ) -> Option<TriggeredEvent> {
        if !self.is_enabled() {
            return None;
        }
        self.apply_consequences(stats);

        let cooldowns = {
            let mut state = self.state.write();
            state.last_update = Some(now);
            state.cooldowns.clone()
        };

        let since_interaction = now - last_interaction;
        let trigger = self.config.triggers.iter().find(|t| {
            gap_elapsed(t, since_interaction)
                && stats.can_satisfy_requirements(&t.conditions)
                && cooldowns.is_ready(&t.name, secs(t.cooldown_secs), now)
                && rng.roll(t.probability)
        })?;

        {
            let mut state = self.state.write();
            state.cooldowns.mark(&trigger.name, now);
            state.fired += 1;
        }

        let mut effects = Effects::new();
        effects.insert(JEALOUSY_STAT.to_string(), trigger.jealousy_increment);
        if trigger.trust_penalty > 0.0 {
            effects.insert("trust".to_string(), -trigger.trust_penalty);
        }
        stats.apply_effects(&effects);
        debug!(
            "jealousy trigger '{}' fired, jealousy now {:.1}",
            trigger.name,
            stats.get_stat(JEALOUSY_STAT)
        );

        Some(TriggeredEvent {
            name:        trigger.name.clone(),
            description: trigger.description.clone(),
            effects,
            animations:  trigger.animations.clone(),
            responses:   trigger.responses.clone(),
            duration:    secs(EVENT_DURATION_SECS),
        })
    }

    fn apply_consequences<S: StatWriter + ?Sized>(&self, stats: &S) {
        let level = stats.get_stat(JEALOUSY_STAT);
        let threshold = self.config.threshold;
        if level < threshold {
            return;
        }
        let span = stats.stat_max(JEALOUSY_STAT) - threshold;
        let intensity = if span > 0.0 {
            ((level - threshold) / span).min(1.0)
        } else {
            1.0
        };
        let scaled: Effects = self
            .config
            .consequences
            .iter()
            .map(|(stat, penalty)| (stat.clone(), penalty * intensity))
            .collect();
        stats.apply_effects(&scaled);
    }

    /// Jealousy as a fraction of its max (0.0 to 1.0). 0 when disabled.
    pub fn jealousy_level<S: StatReader + ?Sized>(&self, stats: &S) -> f64 {
        if !self.is_enabled() {
            return 0.0;
        }
        let max = stats.stat_max(JEALOUSY_STAT);
        if max <= 0.0 {
            return 0.0;
        }
        (stats.get_stat(JEALOUSY_STAT) / max).min(1.0)
    }

    pub fn is_critical<S: StatReader + ?Sized>(&self, stats: &S) -> bool {
        self.is_enabled() && stats.get_stat(JEALOUSY_STAT) >= self.config.threshold
    }

    /// Diagnostic snapshot for hosts and tests.
    pub fn get_status<S: StatReader + ?Sized>(&self, stats: &S) -> BTreeMap<String, Value> {
        let (fired, last_update) = {
            let state = self.state.read();
            (state.fired, state.last_update)
        };
        let mut status = BTreeMap::new();
        status.insert("enabled".into(), json!(self.is_enabled()));
        status.insert("triggerCount".into(), json!(self.config.triggers.len()));
        status.insert("threshold".into(), json!(self.config.threshold));
        status.insert("timesFired".into(), json!(fired));
        status.insert(
            "lastCheck".into(),
            json!(last_update.map(|t| t.to_rfc3339())),
        );
        status.insert("currentJealousy".into(), json!(stats.get_stat(JEALOUSY_STAT)));
        status.insert("isCritical".into(), json!(self.is_critical(stats)));
        status.insert("intensity".into(), json!(self.jealousy_level(stats)));
        status
    }
}

fn gap_elapsed(trigger: &JealousyTrigger, since_interaction: Duration) -> bool {
    trigger.interaction_gap_secs == 0 || since_interaction >= secs(trigger.interaction_gap_secs)
}

impl CompanionSubsystem for JealousyEngine {
    fn name(&self) -> &'static str {
        "jealousy"
    }

    fn update(
        &self,
        ctx: &TickContext<'_>,
        rng: &mut dyn RandomSource,
    ) -> SimResult<Vec<CompanionEvent>> {
        Ok(self.evaluate(ctx.now, ctx.last_interaction, ctx.stats, rng)
            .map(|event| CompanionEvent::Triggered {
                tick: ctx.tick,
                source: EventSource::Jealousy,
                event,
            })
            .into_iter()
            .collect())
    }

    fn reset(&self, _now: Instant) {
        let mut state = self.state.write();
        state.last_update = None;
        state.cooldowns.clear();
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

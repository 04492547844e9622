//! The companion engine, one per simulated companion.
//!
//! EXECUTION ORDER (fixed, documented, never reordered):
//!   1. Decay             stat degradation on the decay interval
//!   2. Random events     general probabilistic triggers
//!   3. Romance events    romance-only probabilistic triggers
//!   4. Jealousy          consequences, then absence triggers
//!   5. Compatibility     modifier decay and behaviour analysis
//!   6. Crisis            detection, ongoing penalties
//!   7. Progression       ageing, levels, achievements
//!
//! RULES:
//!   - Subsystems execute in registration order, every tick.
//!   - Subsystems share state only through the stat store and the
//!     interaction history contracts.
//!   - All randomness flows through the RngBank.
//!   - Every event is returned to the caller and, when a store is
//!     attached, appended to the event log.

use crate::{
    clock::CompanionClock,
    compatibility::{CompatibilityAnalyzer, RESPONSIVENESS_MODIFIER},
    config::{CompanionConfig, InteractionConfig},
    crisis::CrisisManager,
    decay_subsystem::DecaySubsystem,
    error::{SimError, SimResult},
    event::{CompanionEvent, EventLogEntry, EventSource},
    history::{HistoryReader, InteractionLog, RomanceMemory},
    jealousy::JealousyEngine,
    progression::ProgressionTracker,
    random_events::RandomEventEngine,
    rng::{RngBank, SubsystemSlot},
    snapshot::{CompanionSnapshot, SNAPSHOT_INTERVAL},
    stats::{StatReader, StatStore, StatWriter},
    store::CompanionStore,
    subsystem::{CompanionSubsystem, TickContext},
    trigger::CooldownTracker,
    types::{secs, CompanionId, Effects, Instant, Tick},
};
use chrono::Duration;
use log::{debug, info};
use std::any::Any;
use std::sync::Arc;

const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct CompanionEngine {
    pub companion_id: CompanionId,
    pub clock:        CompanionClock,
    pub rng_bank:     RngBank,
    seed:             u64,
    config:           CompanionConfig,
    stats:            Arc<StatStore>,
    history:          Arc<InteractionLog>,
    subsystems:       Vec<(SubsystemSlot, Arc<dyn CompanionSubsystem>)>,
    last_interaction: Instant,
    cooldowns:        CooldownTracker,
    store:            Option<CompanionStore>,
}

impl CompanionEngine {
    /// Build a fully wired engine. Fails if the configuration is invalid.
    pub fn build(
        companion_id: CompanionId,
        seed: u64,
        config: CompanionConfig,
        start: Instant,
    ) -> SimResult<Self> {
        config.validate()?;

        let stats = Arc::new(StatStore::from_config(&config.stats));
        let history = Arc::new(InteractionLog::new());
        let check_interval = secs(config.game_rules.event_check_interval_secs);

        let mut clock = CompanionClock::new(companion_id.clone(), start);
        clock.resume();

        let mut engine = Self {
            companion_id,
            clock,
            rng_bank: RngBank::new(seed),
            seed,
            stats: Arc::clone(&stats),
            history,
            subsystems: Vec::new(),
            last_interaction: start,
            cooldowns: CooldownTracker::new(),
            store: None,
            config: config.clone(),
        };

        // EXECUTION ORDER: fixed, documented, never reordered.
        engine.register(
            SubsystemSlot::Decay,
            Arc::new(DecaySubsystem::new(
                stats,
                secs(config.game_rules.stats_decay_interval_secs),
                start,
            )),
        );
        engine.register(
            SubsystemSlot::RandomEvents,
            Arc::new(RandomEventEngine::random(config.random_events, check_interval)),
        );
        engine.register(
            SubsystemSlot::RomanceEvents,
            Arc::new(RandomEventEngine::romance(config.romance_events, check_interval)),
        );
        engine.register(SubsystemSlot::Jealousy, Arc::new(JealousyEngine::new(config.jealousy)));
        engine.register(
            SubsystemSlot::Compatibility,
            Arc::new(CompatibilityAnalyzer::new(config.compatibility)),
        );
        engine.register(SubsystemSlot::Crisis, Arc::new(CrisisManager::new(config.crisis)));
        if let Some(progression) = config.progression {
            engine.register(
                SubsystemSlot::Progression,
                Arc::new(ProgressionTracker::new(progression)?),
            );
        }
        Ok(engine)
    }

    /// Register a subsystem. Call in the documented execution order.
    pub fn register(&mut self, slot: SubsystemSlot, subsystem: Arc<dyn CompanionSubsystem>) {
        self.subsystems.push((slot, subsystem));
    }

    /// Attach a save store. Migrates the schema and registers the companion.
    pub fn attach_store(&mut self, store: CompanionStore) -> SimResult<()> {
        store.migrate()?;
        store.insert_companion(
            &self.companion_id,
            self.seed,
            ENGINE_VERSION,
            &self.clock.started_at.to_rfc3339(),
        )?;
        self.store = Some(store);
        Ok(())
    }

    pub fn store(&self) -> Option<&CompanionStore> {
        self.store.as_ref()
    }

    pub fn pause(&mut self) {
        self.clock.pause();
    }

    pub fn resume(&mut self) {
        self.clock.resume();
    }

    /// Advance one tick by `elapsed` of simulated time.
    /// A paused engine does nothing and returns no events.
    pub fn tick(&mut self, elapsed: Duration) -> SimResult<Vec<CompanionEvent>> {
        if self.clock.paused {
            debug!("tick() ignored: engine for {} is paused", self.companion_id);
            return Ok(Vec::new());
        }

        // Time never runs backwards, for the clock or for any subsystem.
        let elapsed = elapsed.max(Duration::zero());
        let current_tick = self.clock.advance(elapsed);
        let now = self.clock.now;
        let mut tick_events = vec![CompanionEvent::TickStarted { tick: current_tick }];
        let mut logged: Vec<(&'static str, CompanionEvent)> = Vec::new();

        let ctx = TickContext {
            tick: current_tick,
            now,
            elapsed,
            last_interaction: self.last_interaction,
            stats: &*self.stats,
            history: &*self.history,
        };

        for (slot, subsystem) in &self.subsystems {
            if !subsystem.is_enabled() {
                continue;
            }
            let mut rng = self.rng_bank.for_subsystem(*slot, current_tick);
            let new_events = subsystem.update(&ctx, &mut rng)?;
            for event in &new_events {
                logged.push((subsystem.name(), event.clone()));
            }
            tick_events.extend(new_events);
        }

        tick_events.push(CompanionEvent::TickCompleted { tick: current_tick });

        if self.store.is_some() {
            self.persist(current_tick, &logged)?;
            if current_tick % SNAPSHOT_INTERVAL == 0 {
                self.save_snapshot()?;
            }
        }
        Ok(tick_events)
    }

    /// Run `n` ticks of `step` each. Returns every event, in order.
    pub fn run_ticks(&mut self, n: u64, step: Duration) -> SimResult<Vec<CompanionEvent>> {
        let mut events = Vec::new();
        // Emit RunInitialized at tick 0 so seed differences are observable.
        if self.clock.current_tick == 0 {
            let init = CompanionEvent::RunInitialized {
                companion_id: self.companion_id.clone(),
                seed: self.seed,
            };
            if self.store.is_some() {
                self.persist(0, &[("engine", init.clone())])?;
            }
            events.push(init);
        }
        for _ in 0..n {
            events.extend(self.tick(step)?);
        }
        Ok(events)
    }

    // ── Interactions ───────────────────────────────────────────

    /// Handle a player interaction.
    ///
    /// Returns `InteractionRejected` (no state change) for unknown types,
    /// interactions on cooldown and unmet requirements. Otherwise returns
    /// `InteractionPerformed`, followed by any crisis recovery it caused.
    pub fn perform_interaction(&mut self, interaction_type: &str) -> SimResult<Vec<CompanionEvent>> {
        let tick = self.clock.current_tick;
        let now = self.clock.now;

        let config = self.config.interactions.get(interaction_type).cloned();
        let events = match config {
            None => vec![self.reject(interaction_type, "unknown interaction")],
            Some(cfg) if !self.cooldowns.is_ready(interaction_type, secs(cfg.cooldown_secs), now) => {
                vec![self.reject(interaction_type, "interaction on cooldown")]
            }
            Some(cfg) if !self.stats.can_satisfy_ranges(&cfg.requirements) => {
                vec![self.reject(interaction_type, "requirements not met")]
            }
            Some(cfg) => self.apply_interaction(interaction_type, &cfg, now),
        };

        if self.store.is_some() {
            let logged: Vec<_> = events.iter().map(|e| ("interaction", e.clone())).collect();
            self.persist(tick, &logged)?;
        }
        Ok(events)
    }

    fn reject(&self, interaction_type: &str, reason: &str) -> CompanionEvent {
        debug!("interaction '{interaction_type}' rejected: {reason}");
        CompanionEvent::InteractionRejected {
            tick: self.clock.current_tick,
            interaction_type: interaction_type.to_string(),
            reason: reason.to_string(),
        }
    }

    fn apply_interaction(
        &mut self,
        interaction_type: &str,
        cfg: &InteractionConfig,
        now: Instant,
    ) -> Vec<CompanionEvent> {
        let tick = self.clock.current_tick;
        let multiplier = self
            .compatibility()
            .map_or(1.0, |c| c.modifier_value(RESPONSIVENESS_MODIFIER));
        let effects: Effects = cfg
            .effects
            .iter()
            .map(|(stat, delta)| {
                let scaled = if *delta > 0.0 { delta * multiplier } else { *delta };
                (stat.clone(), scaled)
            })
            .collect();

        let before = self.stats.get_stats();
        self.stats.apply_effects(&effects);
        let after = self.stats.get_stats();

        let previous = self.history.interaction_count(interaction_type);
        self.history.record(interaction_type, now);
        if self.config.has_romance_features() {
            let response = if cfg.responses.is_empty() {
                String::new()
            } else {
                cfg.responses[previous % cfg.responses.len()].clone()
            };
            self.history.record_memory(RomanceMemory {
                timestamp: now,
                interaction_type: interaction_type.to_string(),
                stats_before: before,
                stats_after: after,
                response,
            });
        }
        if let Some(progression) = self.progression() {
            progression.record_interaction(interaction_type);
        }
        self.last_interaction = now;
        self.cooldowns.mark(interaction_type, now);

        let mut events = vec![CompanionEvent::InteractionPerformed {
            tick,
            interaction_type: interaction_type.to_string(),
            effects,
        }];
        if let Some(crisis) = self.crisis() {
            if let Some(recovery) =
                crisis.check_recovery(now, &*self.stats, &*self.history, interaction_type)
            {
                events.push(CompanionEvent::CrisisResolved {
                    tick,
                    name: recovery.crisis.name,
                });
                events.push(CompanionEvent::Triggered {
                    tick,
                    source: EventSource::CrisisRecovery,
                    event: recovery.event,
                });
            }
        }
        events
    }

    pub fn last_interaction(&self) -> Instant {
        self.last_interaction
    }

    // ── Typed handles ──────────────────────────────────────────

    /// A shared handle to the subsystem in `slot`, downcast to `T`.
    /// Safe to hold on other threads for diagnostics.
    pub fn handle<T>(&self, slot: SubsystemSlot) -> SimResult<Arc<T>>
    where
        T: CompanionSubsystem + Any,
    {
        let not_found = || SimError::SubsystemNotFound { name: slot.name().to_string() };
        let (_, subsystem) = self
            .subsystems
            .iter()
            .find(|(s, _)| *s == slot)
            .ok_or_else(not_found)?;
        Arc::clone(subsystem)
            .into_any()
            .downcast::<T>()
            .map_err(|_| not_found())
    }

    pub fn stats(&self) -> Arc<StatStore> {
        Arc::clone(&self.stats)
    }

    pub fn history(&self) -> Arc<InteractionLog> {
        Arc::clone(&self.history)
    }

    pub fn decay(&self) -> Option<Arc<DecaySubsystem>> {
        self.handle(SubsystemSlot::Decay).ok()
    }

    pub fn random_events(&self) -> Option<Arc<RandomEventEngine>> {
        self.handle(SubsystemSlot::RandomEvents).ok()
    }

    pub fn romance_events(&self) -> Option<Arc<RandomEventEngine>> {
        self.handle(SubsystemSlot::RomanceEvents).ok()
    }

    pub fn jealousy(&self) -> Option<Arc<JealousyEngine>> {
        self.handle(SubsystemSlot::Jealousy).ok()
    }

    pub fn compatibility(&self) -> Option<Arc<CompatibilityAnalyzer>> {
        self.handle(SubsystemSlot::Compatibility).ok()
    }

    pub fn crisis(&self) -> Option<Arc<CrisisManager>> {
        self.handle(SubsystemSlot::Crisis).ok()
    }

    pub fn progression(&self) -> Option<Arc<ProgressionTracker>> {
        self.handle(SubsystemSlot::Progression).ok()
    }

    // ── Persistence ────────────────────────────────────────────

    fn persist(&mut self, tick: Tick, events: &[(&'static str, CompanionEvent)]) -> SimResult<()> {
        let Some(store) = self.store.as_mut() else {
            return Ok(());
        };
        let entries = events
            .iter()
            .map(|(subsystem, event)| {
                Ok(EventLogEntry {
                    id:           None,
                    companion_id: self.companion_id.clone(),
                    tick,
                    subsystem:    subsystem.to_string(),
                    event_type:   event.type_name().to_string(),
                    payload:      serde_json::to_string(event)?,
                })
            })
            .collect::<SimResult<Vec<_>>>()?;
        store.append_events(&entries)
    }

    /// Capture the full companion state.
    pub fn snapshot(&self) -> CompanionSnapshot {
        CompanionSnapshot {
            companion_id:     self.companion_id.clone(),
            tick:             self.clock.current_tick,
            clock:            self.clock.clone(),
            stats:            self.stats.snapshot_full(),
            progression:      self.progression().map(|p| p.snapshot()),
            history:          self.history.snapshot(),
            active_crises:    self.crisis().map(|c| c.get_active_crises()).unwrap_or_default(),
            last_interaction: self.last_interaction,
        }
    }

    /// Replace live state with a snapshot. The companion id must match.
    ///
    /// Every part is validated before anything is replaced, so a failed
    /// restore leaves the engine untouched. Cooldowns, check timers and
    /// compatibility modifiers are not saved; they start fresh from the
    /// restored instant.
    pub fn restore(&mut self, snapshot: CompanionSnapshot) -> SimResult<()> {
        if snapshot.companion_id != self.companion_id {
            return Err(SimError::invalid(
                "snapshot",
                format!(
                    "snapshot belongs to '{}', not '{}'",
                    snapshot.companion_id, self.companion_id
                ),
            ));
        }
        StatStore::check_saved(&snapshot.stats)?;
        let tracker = self.progression();
        if let (Some(tracker), Some(state)) = (&tracker, &snapshot.progression) {
            tracker.validate_state(state)?;
        }

        // ── Commit ──
        self.stats.restore(snapshot.stats)?;
        if let (Some(tracker), Some(state)) = (tracker, snapshot.progression) {
            tracker.restore(state)?;
        }
        self.history.restore(snapshot.history);
        if let Some(crisis) = self.crisis() {
            crisis.restore_active(snapshot.active_crises);
        }
        self.cooldowns.clear();
        for (_, subsystem) in &self.subsystems {
            subsystem.reset(snapshot.clock.now);
        }
        let paused = self.clock.paused;
        self.clock = snapshot.clock;
        self.clock.paused = paused;
        self.last_interaction = snapshot.last_interaction;
        info!(
            "restored {} at tick {}",
            self.companion_id, self.clock.current_tick
        );
        Ok(())
    }

    pub fn save_snapshot(&self) -> SimResult<()> {
        if let Some(store) = &self.store {
            let snapshot = self.snapshot();
            store.save_snapshot(&self.companion_id, snapshot.tick, &snapshot.to_json()?)?;
        }
        Ok(())
    }

    /// Restore from the most recent snapshot in the attached store.
    pub fn load_latest(&mut self) -> SimResult<()> {
        let json = self
            .store
            .as_ref()
            .and_then(|s| s.latest_snapshot(&self.companion_id).transpose())
            .transpose()?
            .map(|(_, json)| json)
            .ok_or_else(|| SimError::SnapshotMissing {
                companion_id: self.companion_id.clone(),
            })?;
        self.restore(CompanionSnapshot::from_json(&json)?)
    }

    pub fn store_events_for_tick(&self, tick: Tick) -> SimResult<Vec<EventLogEntry>> {
        match &self.store {
            Some(store) => store.events_for_tick(&self.companion_id, tick),
            None => Ok(Vec::new()),
        }
    }
}

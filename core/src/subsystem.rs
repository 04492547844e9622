//! Subsystem trait and per-tick context.
//!
//! RULE: Every periodic component implements CompanionSubsystem.
//! The engine calls update() on each enabled subsystem in registration
//! order, every tick. Execution order is fixed and documented in engine.rs.
//!
//! RULE: Subsystems take `&self`. Each guards its own state with its own
//! lock, so other threads can read diagnostics while a tick runs.

use crate::{
    error::SimResult,
    event::CompanionEvent,
    history::HistoryReader,
    rng::RandomSource,
    stats::StatWriter,
    types::{Instant, Tick},
};
use chrono::Duration;
use std::any::Any;
use std::sync::Arc;

/// Everything a subsystem may look at during one tick.
pub struct TickContext<'a> {
    pub tick:             Tick,
    pub now:              Instant,
    /// Simulated time since the previous tick.
    pub elapsed:          Duration,
    pub last_interaction: Instant,
    pub stats:            &'a dyn StatWriter,
    pub history:          &'a dyn HistoryReader,
}

/// The contract every periodic component must fulfill.
pub trait CompanionSubsystem: Send + Sync {
    /// Unique stable name for this subsystem.
    fn name(&self) -> &'static str;

    /// Called once per tick by the engine.
    ///
    /// - `ctx`: the current tick, clock and shared state contracts
    /// - `rng`: this subsystem's deterministic random source for this tick
    ///
    /// Returns the events this subsystem produced.
    fn update(
        &self,
        ctx: &TickContext<'_>,
        rng: &mut dyn RandomSource,
    ) -> SimResult<Vec<CompanionEvent>>;

    /// Drop timing state (last checks, cooldowns) after the engine is
    /// restored to `now`. Saved state is restored separately.
    fn reset(&self, now: Instant);

    fn is_enabled(&self) -> bool;

    fn set_enabled(&self, enabled: bool);

    /// For downcasting in tests and tooling only.
    fn as_any(&self) -> &dyn Any;

    /// Owned downcast, used to hand out typed `Arc` handles.
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

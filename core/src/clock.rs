//! Simulated clock. Owns the current instant, tick counter and pause.
//!
//! Components never read the wall clock. The engine advances this clock
//! by the `elapsed` each tick and hands `now` to every subsystem.

use crate::types::{duration_millis, CompanionId, Instant, Tick};
use chrono::Duration;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompanionClock {
    pub companion_id: CompanionId,
    pub current_tick: Tick,
    pub started_at:   Instant,
    pub now:          Instant,
    #[serde(with = "duration_millis")]
    pub total_play_time: Duration,
    pub paused:       bool,
}

impl CompanionClock {
    pub fn new(companion_id: CompanionId, start: Instant) -> Self {
        Self {
            companion_id,
            current_tick: 0,
            started_at: start,
            now: start,
            total_play_time: Duration::zero(),
            paused: true,
        }
    }

    /// Advance one tick by `elapsed`. Returns the new tick number.
    /// Negative spans are treated as zero so time never runs backwards.
    /// Panics if called while paused; callers must check.
    pub fn advance(&mut self, elapsed: Duration) -> Tick {
        assert!(!self.paused, "advance() called on paused clock");
        let step = elapsed.max(Duration::zero());
        self.current_tick += 1;
        self.now = self.now + step;
        self.total_play_time = self.total_play_time + step;
        self.current_tick
    }

    /// Time since the companion was created.
    pub fn age(&self) -> Duration {
        self.now - self.started_at
    }

    pub fn pause(&mut self)  { self.paused = true;  }
    pub fn resume(&mut self) { self.paused = false; }
}

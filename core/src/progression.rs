//! Progression: the level ladder and achievements.
//!
//! RULE: The level index never decreases.
//! RULE: An earned achievement is never removed and never re-evaluated.
//!
//! Achievement timing: when criteria become true a progress record
//! starts. With no sustained-duration requirement the achievement is
//! earned immediately; otherwise `elapsed` accumulates each update
//! (including the one that started it) until the requirement is reached.
//! Criteria turning false resets the accumulated time to zero.

use crate::{
    config::{AchievementConfig, AchievementReward, LevelConfig, ProgressionConfig, AGE_KEY, MAINTAIN_ABOVE_KEY},
    error::{SimError, SimResult},
    event::CompanionEvent,
    rng::RandomSource,
    stats::StatWriter,
    subsystem::{CompanionSubsystem, TickContext},
    types::{duration_millis, Instant},
};
use chrono::Duration;
use log::info;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const DEFAULT_SIZE: u32 = 128;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Progress {
    pub start_time:    Option<Instant>,
    #[serde(with = "duration_millis")]
    pub duration:      Duration,
    #[serde(with = "duration_millis")]
    pub required_time: Duration,
    pub met_criteria:  bool,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            start_time:    None,
            duration:      Duration::zero(),
            required_time: Duration::zero(),
            met_criteria:  false,
        }
    }
}

/// Persisted progression state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressionState {
    pub current_level:        String,
    #[serde(with = "duration_millis")]
    pub age:                  Duration,
    #[serde(with = "duration_millis")]
    pub total_care_time:      Duration,
    /// Earned achievements in the order they were earned.
    pub achievements:         Vec<String>,
    pub interaction_counts:   BTreeMap<String, u64>,
    pub achievement_progress: BTreeMap<String, Progress>,
}

impl ProgressionState {
    fn new(first_level: &str) -> Self {
        Self {
            current_level:        first_level.to_string(),
            age:                  Duration::zero(),
            total_care_time:      Duration::zero(),
            achievements:         Vec::new(),
            interaction_counts:   BTreeMap::new(),
            achievement_progress: BTreeMap::new(),
        }
    }

    pub fn has_achievement(&self, name: &str) -> bool {
        self.achievements.iter().any(|a| a == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AchievementDetails {
    pub name:        String,
    pub description: String,
    pub earned_at:   Instant,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward:      Option<AchievementReward>,
}

/// Explicit description if configured, otherwise one derived from the
/// first well-known stat the requirement mentions.
pub fn achievement_description(config: &AchievementConfig) -> String {
    if let Some(description) = &config.description {
        return description.clone();
    }
    let req = &config.requirement;
    let text = if req.is_empty() {
        "Achievement unlocked!"
    } else if req.contains_key("happiness") {
        "Maintained excellent happiness level!"
    } else if req.contains_key("hunger") {
        "Kept your companion well-fed!"
    } else if req.contains_key("health") {
        "Maintained excellent health!"
    } else if req.contains_key("energy") {
        "Kept your companion energized!"
    } else {
        "Special achievement unlocked!"
    };
    text.to_string()
}

/// What one progression update produced.
#[derive(Debug, Clone, Default)]
pub struct ProgressionOutcome {
    /// (from, to) when the level advanced.
    pub level_change: Option<(String, String)>,
    pub earned:       Vec<AchievementDetails>,
}

pub struct ProgressionTracker {
    config:  ProgressionConfig,
    state:   RwLock<ProgressionState>,
    enabled: AtomicBool,
}

impl ProgressionTracker {
    /// The config must already be validated (non-empty ladder).
    pub fn new(config: ProgressionConfig) -> SimResult<Self> {
        let first = config
            .levels
            .first()
            .ok_or_else(|| SimError::invalid("progression", "must have at least one level"))?
            .name
            .clone();
        Ok(Self {
            config,
            state: RwLock::new(ProgressionState::new(&first)),
            enabled: AtomicBool::new(true),
        })
    }

    /// Age the companion by `elapsed`, then evaluate levels and achievements.
    pub fn advance<S: StatWriter + ?Sized>(
        &self,
        now: Instant,
        stats: &S,
        elapsed: Duration,
    ) -> ProgressionOutcome {
        let mut outcome = ProgressionOutcome::default();
        if !self.is_enabled() {
            return outcome;
        }
        let elapsed = elapsed.max(Duration::zero());
        let values = stats.get_stats();
        let mut rewards = Vec::new();

        {
            let mut state = self.state.write();
            state.age = state.age + elapsed;
            state.total_care_time = state.total_care_time + elapsed;

            let from = state.current_level.clone();
            if self.advance_levels(&mut state, &values) {
                outcome.level_change = Some((from, state.current_level.clone()));
            }

            for achievement in &self.config.achievements {
                if state.has_achievement(&achievement.name) {
                    continue;
                }
                let met = criteria_hold(achievement, &values);
                let mut progress = state
                    .achievement_progress
                    .get(&achievement.name)
                    .cloned()
                    .unwrap_or_default();

                let mut earned = false;
                if met && !progress.met_criteria {
                    progress = Progress {
                        start_time:    Some(now),
                        duration:      Duration::zero(),
                        required_time: Duration::seconds(achievement.required_secs() as i64),
                        met_criteria:  true,
                    };
                    earned = progress.required_time <= Duration::zero();
                } else if !met && progress.met_criteria {
                    progress.met_criteria = false;
                    progress.duration = Duration::zero();
                }

                if !earned && progress.met_criteria && progress.required_time > Duration::zero() {
                    progress.duration = progress.duration + elapsed;
                    earned = progress.duration >= progress.required_time;
                }

                state
                    .achievement_progress
                    .insert(achievement.name.clone(), progress);
                if earned {
                    state.achievements.push(achievement.name.clone());
                    info!("achievement earned: {}", achievement.name);
                    if let Some(reward) = &achievement.reward {
                        rewards.push(reward.clone());
                    }
                    outcome.earned.push(AchievementDetails {
                        name:        achievement.name.clone(),
                        description: achievement_description(achievement),
                        earned_at:   now,
                        reward:      achievement.reward.clone(),
                    });
                }
            }
        }

        for reward in rewards {
            for (stat, boost) in &reward.stat_boosts {
                stats.boost_stat(stat, *boost);
            }
        }
        if let Some((from, to)) = &outcome.level_change {
            info!("level changed {from} -> {to}");
        }
        outcome
    }

    /// Move forward through the ladder while the next matching level's
    /// requirements hold. Returns true if the level changed.
    fn advance_levels(&self, state: &mut ProgressionState, values: &BTreeMap<String, f64>) -> bool {
        let mut changed = false;
        loop {
            let current = self.level_index(&state.current_level);
            let next = self.config.levels[current + 1..]
                .iter()
                .find(|level| level_requirements_met(level, state.age, values));
            match next {
                Some(level) => {
                    state.current_level = level.name.clone();
                    changed = true;
                }
                None => return changed,
            }
        }
    }

    fn level_index(&self, name: &str) -> usize {
        self.config
            .levels
            .iter()
            .position(|l| l.name == name)
            .unwrap_or(0)
    }

    pub fn record_interaction(&self, interaction_type: &str) {
        *self
            .state
            .write()
            .interaction_counts
            .entry(interaction_type.to_string())
            .or_default() += 1;
    }

    pub fn current_level(&self) -> Option<LevelConfig> {
        let name = self.state.read().current_level.clone();
        self.config.levels.iter().find(|l| l.name == name).cloned()
    }

    pub fn current_level_index(&self) -> usize {
        let name = self.state.read().current_level.clone();
        self.level_index(&name)
    }

    pub fn current_size(&self) -> u32 {
        self.current_level()
            .map(|l| l.size)
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_SIZE)
    }

    /// Level-specific override for an animation, if the level defines one.
    pub fn level_animation(&self, animation: &str) -> Option<String> {
        self.current_level()?.animations.get(animation).cloned()
    }

    pub fn get_age(&self) -> Duration {
        self.state.read().age
    }

    pub fn get_achievements(&self) -> Vec<String> {
        self.state.read().achievements.clone()
    }

    pub fn interaction_counts(&self) -> BTreeMap<String, u64> {
        self.state.read().interaction_counts.clone()
    }

    pub fn progress_for(&self, achievement: &str) -> Option<Progress> {
        self.state.read().achievement_progress.get(achievement).cloned()
    }

    pub fn config(&self) -> &ProgressionConfig {
        &self.config
    }

    pub fn snapshot(&self) -> ProgressionState {
        self.state.read().clone()
    }

    pub fn restore(&self, state: ProgressionState) -> SimResult<()> {
        self.validate_state(&state)?;
        *self.state.write() = state;
        Ok(())
    }

    /// Check the live state against the ladder.
    pub fn validate(&self) -> SimResult<()> {
        self.validate_state(&self.state.read())
    }

    /// Check a saved state against the ladder without applying it.
    pub fn validate_state(&self, state: &ProgressionState) -> SimResult<()> {
        if !self.config.levels.iter().any(|l| l.name == state.current_level) {
            return Err(SimError::invalid(
                "progression",
                format!("current level '{}' not found in level ladder", state.current_level),
            ));
        }
        if state.age < Duration::zero() || state.total_care_time < Duration::zero() {
            return Err(SimError::invalid("progression", "age and care time cannot be negative"));
        }
        Ok(())
    }
}

fn criteria_hold(achievement: &AchievementConfig, values: &BTreeMap<String, f64>) -> bool {
    achievement
        .requirement
        .iter()
        .filter(|(stat, _)| stat.as_str() != MAINTAIN_ABOVE_KEY)
        .all(|(stat, criteria)| values.get(stat).map_or(false, |v| criteria.holds(*v)))
}

fn level_requirements_met(level: &LevelConfig, age: Duration, values: &BTreeMap<String, f64>) -> bool {
    level.requirement.iter().all(|(key, required)| {
        if key == AGE_KEY {
            age.num_seconds() >= *required
        } else {
            values.get(key).map_or(false, |v| *v >= *required as f64)
        }
    })
}

impl CompanionSubsystem for ProgressionTracker {
    fn name(&self) -> &'static str {
        "progression"
    }

    fn update(
        &self,
        ctx: &TickContext<'_>,
        _rng: &mut dyn RandomSource,
    ) -> SimResult<Vec<CompanionEvent>> {
        let outcome = self.advance(ctx.now, ctx.stats, ctx.elapsed);
        let mut events = Vec::new();
        if let Some((from, to)) = outcome.level_change {
            events.push(CompanionEvent::LevelChanged { tick: ctx.tick, from, to });
        }
        events.extend(
            outcome
                .earned
                .into_iter()
                .map(|details| CompanionEvent::AchievementEarned { tick: ctx.tick, details }),
        );
        Ok(events)
    }

    fn reset(&self, _now: Instant) {}

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

//! Compatibility analyzer: adapts to how the player behaves.
//!
//! Every update:
//!   1. Decay each active modifier from its creation time and drop the
//!      ones that have faded to within 0.01 of their floor
//!   2. Once per analysis interval, rebuild the `PlayerBehaviorPattern`
//!      from interaction history and mint bonus modifiers for
//!      consistent, varied and frequent players
//!
//! A freshly minted modifier replaces any active one with the same stat
//! name. `force_analysis` skips the interval gate (tests and tooling).

use crate::{
    config::{CompatibilityConfig, ModifierTemplate},
    error::SimResult,
    event::CompanionEvent,
    history::HistoryReader,
    rng::RandomSource,
    subsystem::{CompanionSubsystem, TickContext},
    types::Instant,
};
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const EXPIRY_EPSILON: f64 = 0.01;
/// Consistency score when there are too few interactions to judge.
const NEUTRAL_CONSISTENCY: f64 = 0.5;
/// Stddev of gaps (minutes) at which consistency bottoms out.
const CONSISTENCY_NORMALIZER_MINUTES: f64 = 60.0;

pub const RESPONSIVENESS_MODIFIER: &str = "interaction_responsiveness_bonus";

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompatibilityModifier {
    pub stat_name:     String,
    pub value:         f64,
    pub initial_value: f64,
    pub reason:        String,
    pub created_at:    Instant,
    /// Fraction lost per hour.
    pub decay_rate:    f64,
    pub min_value:     f64,
    pub max_value:     f64,
}

impl CompatibilityModifier {
    fn mint(template: &ModifierTemplate, strength: f64, now: Instant) -> Self {
        let value = (template.base + strength * template.max_bonus_fraction)
            .clamp(template.min_value, template.max_value);
        Self {
            stat_name:     template.stat_name.clone(),
            value,
            initial_value: value,
            reason:        template.reason.clone(),
            created_at:    now,
            decay_rate:    template.decay_rate,
            min_value:     template.min_value,
            max_value:     template.max_value,
        }
    }

    /// Recompute the value for `now`. Always derived from the initial value,
    /// so calling this repeatedly never compounds.
    fn decay_to(&mut self, now: Instant) {
        let hours = (now - self.created_at).num_milliseconds().max(0) as f64 / 3_600_000.0;
        let factor = (1.0 - self.decay_rate).max(0.0).powf(hours);
        self.value = (self.initial_value * factor).clamp(self.min_value, self.max_value);
    }

    fn is_expired(&self) -> bool {
        self.value <= self.min_value + EXPIRY_EPSILON
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlayerBehaviorPattern {
    /// Interaction type → retained count.
    pub interaction_frequency:  BTreeMap<String, f64>,
    /// Interaction type → mean gap between uses, in minutes.
    pub preferred_time_gaps:    BTreeMap<String, f64>,
    pub consistency_score:      f64,
    pub variety_score:          f64,
    pub total_interactions:     usize,
    pub interactions_per_minute: f64,
    pub last_analysis:          Option<Instant>,
}

impl PlayerBehaviorPattern {
    /// Derive a pattern from a copy of the interaction history.
    pub fn analyze(history: &BTreeMap<String, Vec<Instant>>, now: Instant) -> Self {
        let mut pattern = Self {
            last_analysis: Some(now),
            ..Self::default()
        };
        for (kind, stamps) in history {
            pattern.interaction_frequency.insert(kind.clone(), stamps.len() as f64);
            pattern.total_interactions += stamps.len();
            if stamps.len() > 1 {
                let total: f64 = stamps.windows(2).map(|w| minutes_between(w[0], w[1])).sum();
                pattern
                    .preferred_time_gaps
                    .insert(kind.clone(), total / (stamps.len() - 1) as f64);
            }
        }
        pattern.consistency_score = consistency_score(history);
        pattern.variety_score = variety_score(history);
        pattern.interactions_per_minute = interactions_per_minute(history, now);
        pattern
    }
}

/// `max(0, 1 − stddev(gaps)/60)` over every interaction sorted by time.
pub fn consistency_score(history: &BTreeMap<String, Vec<Instant>>) -> f64 {
    if history.is_empty() {
        return 0.0;
    }
    let mut all: Vec<Instant> = history.values().flatten().copied().collect();
    if all.len() < 3 {
        return NEUTRAL_CONSISTENCY;
    }
    all.sort();
    let gaps: Vec<f64> = all.windows(2).map(|w| minutes_between(w[0], w[1])).collect();
    let mean = gaps.iter().sum::<f64>() / gaps.len() as f64;
    let variance = gaps.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / gaps.len() as f64;
    (1.0 - variance.sqrt() / CONSISTENCY_NORMALIZER_MINUTES).max(0.0)
}

/// Shannon entropy of type proportions, normalised by `log2(types)`.
pub fn variety_score(history: &BTreeMap<String, Vec<Instant>>) -> f64 {
    let total: usize = history.values().map(Vec::len).sum();
    if total == 0 {
        return 0.0;
    }
    let used: Vec<usize> = history.values().map(Vec::len).filter(|n| *n > 0).collect();
    let max_entropy = (used.len() as f64).log2();
    if max_entropy <= 0.0 {
        return 0.0;
    }
    let entropy: f64 = used
        .iter()
        .map(|n| {
            let p = *n as f64 / total as f64;
            -p * p.log2()
        })
        .sum();
    entropy / max_entropy
}

fn interactions_per_minute(history: &BTreeMap<String, Vec<Instant>>, now: Instant) -> f64 {
    let total: usize = history.values().map(Vec::len).sum();
    let Some(first) = history.values().flatten().min() else {
        return 0.0;
    };
    let minutes = minutes_between(*first, now);
    if minutes <= 0.0 {
        return 0.0;
    }
    total as f64 / minutes
}

fn minutes_between(a: Instant, b: Instant) -> f64 {
    (b - a).num_milliseconds() as f64 / 60_000.0
}

// ── Analyzer ─────────────────────────────────────────────────────────────────

/// What one update pass changed.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOutcome {
    pub added:   Vec<CompatibilityModifier>,
    pub expired: Vec<String>,
    pub active:  Vec<CompatibilityModifier>,
}

#[derive(Debug, Default)]
struct AnalyzerState {
    adaptation_strength: f64,
    pattern:             PlayerBehaviorPattern,
    modifiers:           BTreeMap<String, CompatibilityModifier>,
    last_analysis:       Option<Instant>,
}

pub struct CompatibilityAnalyzer {
    config:  CompatibilityConfig,
    state:   RwLock<AnalyzerState>,
    enabled: AtomicBool,
}

impl CompatibilityAnalyzer {
    pub fn new(config: CompatibilityConfig) -> Self {
        let state = AnalyzerState {
            adaptation_strength: config.adaptation_strength.clamp(0.0, 1.0),
            ..AnalyzerState::default()
        };
        let enabled = config.enabled;
        Self {
            config,
            state: RwLock::new(state),
            enabled: AtomicBool::new(enabled),
        }
    }

    /// Decay, and analyse if the interval has passed.
    pub fn refresh<H: HistoryReader + ?Sized>(&self, now: Instant, history: &H) -> AnalysisOutcome {
        self.step(now, history, false)
    }

    /// Analyse immediately regardless of the interval.
    pub fn force_analysis<H: HistoryReader + ?Sized>(
        &self,
        now: Instant,
        history: &H,
    ) -> Vec<CompatibilityModifier> {
        self.step(now, history, true).active
    }

    fn step<H: HistoryReader + ?Sized>(&self, now: Instant, history: &H, force: bool) -> AnalysisOutcome {
        let mut outcome = AnalysisOutcome::default();
        if !self.is_enabled() {
            return outcome;
        }

        let due = force || {
            let state = self.state.read();
            state.last_analysis.map_or(true, |last| {
                (now - last).num_seconds() >= self.config.analysis_interval_secs as i64
            })
        };
        // Copy history before taking our own lock.
        let snapshot = due.then(|| history.interaction_history());

        let mut state = self.state.write();
        for modifier in state.modifiers.values_mut() {
            modifier.decay_to(now);
        }
        state.modifiers.retain(|name, m| {
            let keep = !m.is_expired();
            if !keep {
                outcome.expired.push(name.clone());
            }
            keep
        });

        if let Some(history) = snapshot {
            state.last_analysis = Some(now);
            state.pattern = PlayerBehaviorPattern::analyze(&history, now);
            let strength = state.adaptation_strength;
            for template in self.qualifying_templates(&state.pattern) {
                let modifier = CompatibilityModifier::mint(template, strength, now);
                debug!(
                    "compatibility: {} = {:.3} ({})",
                    modifier.stat_name, modifier.value, modifier.reason
                );
                state.modifiers.insert(modifier.stat_name.clone(), modifier.clone());
                outcome.added.push(modifier);
            }
        }

        outcome.active = state.modifiers.values().cloned().collect();
        outcome
    }

    fn qualifying_templates(&self, pattern: &PlayerBehaviorPattern) -> Vec<&ModifierTemplate> {
        let mut templates = Vec::new();
        if pattern.total_interactions == 0 {
            return templates;
        }
        if pattern.consistency_score >= self.config.consistency_threshold {
            templates.push(&self.config.consistent);
        }
        if pattern.variety_score >= self.config.variety_threshold {
            templates.push(&self.config.variety);
        }
        if pattern.interactions_per_minute >= self.config.frequency_threshold {
            templates.push(&self.config.responsiveness);
        }
        templates
    }

    pub fn active_modifiers(&self) -> Vec<CompatibilityModifier> {
        self.state.read().modifiers.values().cloned().collect()
    }

    /// Current multiplier for `stat_name`, 1.0 when no modifier is active.
    pub fn modifier_value(&self, stat_name: &str) -> f64 {
        self.state
            .read()
            .modifiers
            .get(stat_name)
            .map_or(1.0, |m| m.value)
    }

    /// `None` while disabled.
    pub fn get_player_pattern(&self) -> Option<PlayerBehaviorPattern> {
        self.is_enabled().then(|| self.state.read().pattern.clone())
    }

    pub fn adaptation_strength(&self) -> f64 {
        self.state.read().adaptation_strength
    }

    /// Clamped to [0, 1].
    pub fn set_adaptation_strength(&self, strength: f64) {
        self.state.write().adaptation_strength = strength.clamp(0.0, 1.0);
    }

    pub fn get_compatibility_insights(&self, now: Instant) -> BTreeMap<String, Value> {
        let mut insights = BTreeMap::new();
        insights.insert("enabled".into(), json!(self.is_enabled()));
        if !self.is_enabled() {
            return insights;
        }
        let state = self.state.read();
        insights.insert("adaptationStrength".into(), json!(state.adaptation_strength));
        insights.insert("analysisIntervalSecs".into(), json!(self.config.analysis_interval_secs));
        insights.insert("activeModifiers".into(), json!(state.modifiers.len()));
        insights.insert("playerPattern".into(), json!(state.pattern));
        insights.insert(
            "lastUpdate".into(),
            json!(state.last_analysis.map(|t| t.to_rfc3339())),
        );
        let details: Vec<Value> = state
            .modifiers
            .values()
            .map(|m| {
                json!({
                    "statName": m.stat_name,
                    "modifierValue": m.value,
                    "reason": m.reason,
                    "createdAt": m.created_at.to_rfc3339(),
                    "ageSecs": (now - m.created_at).num_seconds(),
                })
            })
            .collect();
        insights.insert("modifierDetails".into(), Value::Array(details));
        insights
    }
}

impl CompanionSubsystem for CompatibilityAnalyzer {
    fn name(&self) -> &'static str {
        "compatibility"
    }

    fn update(
        &self,
        ctx: &TickContext<'_>,
        _rng: &mut dyn RandomSource,
    ) -> SimResult<Vec<CompanionEvent>> {
        let outcome = self.refresh(ctx.now, ctx.history);
        let expired = outcome
            .expired
            .into_iter()
            .map(|stat_name| CompanionEvent::ModifierExpired { tick: ctx.tick, stat_name });
        let added = outcome.added.into_iter().map(|m| CompanionEvent::ModifierAdded {
            tick: ctx.tick,
            stat_name: m.stat_name,
            value: m.value,
            reason: m.reason,
        });
        Ok(expired.chain(added).collect())
    }

    /// Modifiers are not saved. They are re-derived from the restored
    /// history on the next analysis.
    fn reset(&self, _now: Instant) {
        let mut state = self.state.write();
        state.modifiers.clear();
        state.pattern = PlayerBehaviorPattern::default();
        state.last_analysis = None;
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

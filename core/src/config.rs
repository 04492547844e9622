use crate::{
    error::{SimError, SimResult},
    types::{Effects, StatMinimums, StatRange},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Longest cooldown any trigger or interaction may declare (7 days).
pub const MAX_COOLDOWN_SECS: u64 = 7 * 24 * 3600;
/// Longest sustained duration / recovery wait allowed (30 days).
pub const MAX_DURATION_SECS: u64 = 30 * 24 * 3600;

/// Condition keys that are not stat names.
pub const INTERACTION_COUNT_KEY: &str = "interactionCount";
pub const MEMORY_COUNT_KEY: &str = "memoryCount";
pub const MAINTAIN_ABOVE_KEY: &str = "maintainAbove";
pub const AGE_KEY: &str = "age";

// ── Stats ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatConfig {
    pub initial: f64,
    pub max: f64,
    /// Points lost per minute.
    #[serde(default)]
    pub degradation_rate: f64,
    #[serde(default)]
    pub critical_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameRules {
    #[serde(default = "default_decay_interval")]
    pub stats_decay_interval_secs: u64,
    #[serde(default = "default_event_check_interval")]
    pub event_check_interval_secs: u64,
}

fn default_decay_interval() -> u64 { 60 }
fn default_event_check_interval() -> u64 { 30 }

impl Default for GameRules {
    fn default() -> Self {
        Self {
            stats_decay_interval_secs: default_decay_interval(),
            event_check_interval_secs: default_event_check_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct StatsFile {
    stats: BTreeMap<String, StatConfig>,
    #[serde(default)]
    game_rules: GameRules,
}

// ── Interactions ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionConfig {
    pub effects: Effects,
    #[serde(default)]
    pub requirements: BTreeMap<String, StatRange>,
    #[serde(default)]
    pub cooldown_secs: u64,
    #[serde(default)]
    pub animations: Vec<String>,
    #[serde(default)]
    pub responses: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct InteractionsFile {
    interactions: BTreeMap<String, InteractionConfig>,
}

// ── Random / romance events ────────────────────────────────────────

/// Stat name → {"min": x, "max": y}, plus the special keys
/// `interactionCount` and `memoryCount`.
pub type EventConditions = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RandomEventConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// 0.0 to 1.0 chance of firing per check.
    pub probability: f64,
    #[serde(default)]
    pub effects: Effects,
    #[serde(default)]
    pub animations: Vec<String>,
    #[serde(default)]
    pub responses: Vec<String>,
    #[serde(default)]
    pub cooldown_secs: u64,
    #[serde(default)]
    pub duration_secs: u64,
    #[serde(default)]
    pub conditions: EventConditions,
}

#[derive(Debug, Clone, Deserialize)]
struct EventsFile {
    events: Vec<RandomEventConfig>,
}

// ── Personality ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Personality {
    #[serde(default)]
    pub traits: BTreeMap<String, f64>,
    #[serde(default)]
    pub compatibility: BTreeMap<String, f64>,
}

impl Personality {
    /// Trait value, 0.5 when absent.
    pub fn trait_value(&self, name: &str) -> f64 {
        self.traits.get(name).copied().unwrap_or(0.5)
    }

    fn validate(&self) -> SimResult<()> {
        for (name, value) in &self.traits {
            if !(0.0..=1.0).contains(value) {
                return Err(SimError::invalid(
                    "personality",
                    format!("trait '{name}' must be 0.0-1.0, got {value}"),
                ));
            }
        }
        for (name, value) in &self.compatibility {
            if !(0.0..=5.0).contains(value) {
                return Err(SimError::invalid(
                    "personality",
                    format!("compatibility '{name}' must be 0.0-5.0, got {value}"),
                ));
            }
        }
        Ok(())
    }
}

// ── Jealousy ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JealousyTrigger {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Time since the last player interaction before this may fire.
    #[serde(default)]
    pub interaction_gap_secs: u64,
    pub jealousy_increment: f64,
    #[serde(default)]
    pub trust_penalty: f64,
    #[serde(default)]
    pub conditions: StatMinimums,
    #[serde(default)]
    pub responses: Vec<String>,
    #[serde(default)]
    pub animations: Vec<String>,
    pub probability: f64,
    #[serde(default)]
    pub cooldown_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JealousyConfig {
    pub enabled: bool,
    pub threshold: f64,
    pub triggers: Vec<JealousyTrigger>,
    /// Full-intensity penalties applied while jealousy is above threshold.
    pub consequences: Effects,
    pub check_interval_secs: u64,
}

impl JealousyConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            threshold: 80.0,
            triggers: Vec::new(),
            consequences: default_jealousy_consequences(),
            check_interval_secs: 30,
        }
    }

    /// Jealousy tuned from the `jealousy_prone` trait.
    pub fn from_personality(personality: &Personality) -> Self {
        let jp = personality.trait_value("jealousy_prone");
        let mut triggers = Vec::new();
        if jp >= 0.3 {
            // More jealous characters notice absence sooner: 60 to 120 minutes.
            let base_gap = (120 - (jp * 60.0) as u64) * 60;
            triggers.push(JealousyTrigger {
                name: "neglect_jealousy".into(),
                description: "Character feels neglected due to lack of interaction".into(),
                interaction_gap_secs: base_gap,
                jealousy_increment: 10.0 + jp * 15.0,
                trust_penalty: 2.0 + jp * 3.0,
                conditions: [("affection".to_string(), 20.0)].into(),
                responses: vec![
                    "Where have you been? I've been waiting for you...".into(),
                    "Are you spending time with someone else?".into(),
                    "I feel like you're ignoring me...".into(),
                ],
                animations: vec!["jealous".into(), "sad".into()],
                probability: 0.3 + jp * 0.4,
                cooldown_secs: base_gap,
            });
            triggers.push(JealousyTrigger {
                name: "attention_jealousy".into(),
                description: "Character wants more attention and feels insecure".into(),
                interaction_gap_secs: base_gap / 2,
                jealousy_increment: 5.0 + jp * 10.0,
                trust_penalty: 1.0 + jp * 2.0,
                conditions: [
                    ("affection".to_string(), 30.0),
                    ("jealousy".to_string(), 10.0),
                ]
                .into(),
                responses: vec![
                    "Do you still find me interesting?".into(),
                    "I need to know you care about me...".into(),
                    "Am I not enough for you anymore?".into(),
                ],
                animations: vec!["shy".into(), "sad".into()],
                probability: 0.2 + jp * 0.3,
                cooldown_secs: base_gap / 2,
            });
        }
        Self {
            enabled: jp > 0.3,
            threshold: 70.0 + jp * 20.0,
            triggers,
            consequences: default_jealousy_consequences(),
            check_interval_secs: 30,
        }
    }

    /// The threshold is checked against the declared `jealousy` stat's max.
    pub fn validate(&self, stats: &BTreeMap<String, StatConfig>) -> SimResult<()> {
        const SECTION: &str = "jealousy";
        if !self.enabled {
            return Ok(());
        }
        let declared: BTreeSet<String> = stats.keys().cloned().collect();
        let declared = &declared;
        require_stat(SECTION, "jealousy engine", "jealousy", declared)?;
        let max = stats.get("jealousy").map_or(0.0, |s| s.max);
        if !(0.0..max).contains(&self.threshold) {
            return Err(SimError::invalid(
                SECTION,
                format!("threshold must be in [0, {max}), got {}", self.threshold),
            ));
        }
        check_effect_stats(SECTION, "consequences", &self.consequences, declared)?;
        for t in &self.triggers {
            let ctx = format!("trigger '{}'", t.name);
            check_probability(SECTION, &ctx, t.probability)?;
            check_cooldown(SECTION, &ctx, t.cooldown_secs)?;
            check_duration(SECTION, &ctx, t.interaction_gap_secs)?;
            for stat in t.conditions.keys() {
                require_stat(SECTION, &ctx, stat, declared)?;
            }
            if t.trust_penalty > 0.0 {
                require_stat(SECTION, &ctx, "trust", declared)?;
            }
        }
        Ok(())
    }
}

fn default_jealousy_consequences() -> Effects {
    [
        ("affection".to_string(), -2.0),
        ("trust".to_string(), -1.5),
        ("happiness".to_string(), -3.0),
    ]
    .into()
}

// ── Compatibility ──────────────────────────────────────────────────

/// How a modifier is minted when its behaviour threshold is crossed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModifierTemplate {
    pub stat_name: String,
    pub reason: String,
    pub base: f64,
    /// Bonus at full adaptation strength, as a fraction of `base`.
    pub max_bonus_fraction: f64,
    /// Fraction lost per hour.
    pub decay_rate: f64,
    pub min_value: f64,
    pub max_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompatibilityConfig {
    pub enabled: bool,
    pub adaptation_strength: f64,
    pub analysis_interval_secs: u64,
    pub consistency_threshold: f64,
    pub variety_threshold: f64,
    /// Interactions per minute.
    pub frequency_threshold: f64,
    pub consistent: ModifierTemplate,
    pub variety: ModifierTemplate,
    pub responsiveness: ModifierTemplate,
}

impl CompatibilityConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::with_strength(0.5)
        }
    }

    pub fn from_personality(personality: &Personality) -> Self {
        let strength = match personality.traits.get("affection_responsiveness") {
            Some(v) if *v > 0.0 => v * 0.8,
            _ => 0.5,
        };
        Self::with_strength(strength)
    }

    fn with_strength(adaptation_strength: f64) -> Self {
        Self {
            enabled: true,
            adaptation_strength: adaptation_strength.clamp(0.0, 1.0),
            analysis_interval_secs: 300,
            consistency_threshold: 0.8,
            variety_threshold: 0.7,
            frequency_threshold: 0.5,
            consistent: ModifierTemplate {
                stat_name: "consistent_interaction_bonus".into(),
                reason: "Player shows consistent interaction patterns".into(),
                base: 1.0,
                max_bonus_fraction: 0.3,
                decay_rate: 0.02,
                min_value: 1.0,
                max_value: 1.5,
            },
            variety: ModifierTemplate {
                stat_name: "variety_preference_bonus".into(),
                reason: "Player enjoys interaction variety".into(),
                base: 1.0,
                max_bonus_fraction: 0.25,
                decay_rate: 0.03,
                min_value: 1.0,
                max_value: 1.4,
            },
            responsiveness: ModifierTemplate {
                stat_name: "interaction_responsiveness_bonus".into(),
                reason: "Player interacts frequently and actively".into(),
                base: 1.0,
                max_bonus_fraction: 0.2,
                decay_rate: 0.015,
                min_value: 1.0,
                max_value: 1.3,
            },
        }
    }

    pub fn validate(&self) -> SimResult<()> {
        const SECTION: &str = "compatibility";
        if !self.enabled {
            return Ok(());
        }
        if self.analysis_interval_secs == 0 {
            return Err(SimError::invalid(SECTION, "analysis interval must be > 0"));
        }
        check_probability(SECTION, "adaptation_strength", self.adaptation_strength)?;
        for t in [&self.consistent, &self.variety, &self.responsiveness] {
            if t.min_value > t.max_value {
                return Err(SimError::invalid(
                    SECTION,
                    format!("modifier '{}' has min {} > max {}", t.stat_name, t.min_value, t.max_value),
                ));
            }
            if !(0.0..1.0).contains(&t.decay_rate) {
                return Err(SimError::invalid(
                    SECTION,
                    format!("modifier '{}' decay rate must be in [0, 1)", t.stat_name),
                ));
            }
        }
        Ok(())
    }
}

// ── Crisis ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CrisisDirection {
    /// Crisis when the stat rises to or above the threshold.
    Above,
    /// Crisis when the stat falls to or below the threshold.
    Below,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecoveryConfig {
    /// Interaction type → count required since the crisis began.
    #[serde(default)]
    pub required_interactions: BTreeMap<String, u32>,
    /// Stat bounds that must hold, e.g. jealousy back under 60.
    #[serde(default)]
    pub required_stats: BTreeMap<String, StatRange>,
    pub time_requirement_secs: u64,
    #[serde(default)]
    pub forgiveness_responses: Vec<String>,
    #[serde(default)]
    pub recovery_animations: Vec<String>,
    #[serde(default)]
    pub stat_bonuses: Effects,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrisisDefinition {
    pub name: String,
    pub description: String,
    pub stat: String,
    pub direction: CrisisDirection,
    pub threshold: f64,
    /// Distance past the threshold that maps to severity 1.0.
    pub severity_scale: f64,
    pub trigger_cause: String,
    /// Per-tick penalties at severity 1.0.
    pub penalties: Effects,
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub onset_responses: Vec<String>,
    #[serde(default)]
    pub onset_animations: Vec<String>,
    #[serde(default)]
    pub ongoing_responses: Vec<String>,
    #[serde(default)]
    pub ongoing_animations: Vec<String>,
}

impl CrisisDefinition {
    /// Whether `value` is past the threshold in this definition's direction.
    pub fn is_breached(&self, value: f64) -> bool {
        match self.direction {
            CrisisDirection::Above => value >= self.threshold,
            CrisisDirection::Below => value <= self.threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrisisConfig {
    pub enabled: bool,
    pub check_interval_secs: u64,
    pub max_active: usize,
    /// Multiplier on recovery stat bonuses. Never below 1.0.
    pub recovery_bonus: f64,
    /// Chance per tick of surfacing an "ongoing crisis" event.
    pub ongoing_event_chance: f64,
    pub definitions: Vec<CrisisDefinition>,
}

impl CrisisConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::from_personality(&Personality::default())
        }
    }

    /// Built-in crisis types with thresholds tuned by personality.
    pub fn from_personality(personality: &Personality) -> Self {
        let jealousy_threshold = 80.0 - personality.trait_value("jealousy_prone") * 20.0;
        let trust_threshold = 15.0 + personality.trait_value("trust_difficulty") * 10.0;
        let affection_threshold =
            10.0 + personality.trait_value("affection_responsiveness") * 10.0;

        Self {
            enabled: true,
            check_interval_secs: 60,
            max_active: 2,
            recovery_bonus: 1.2,
            ongoing_event_chance: 0.02,
            definitions: vec![
                jealousy_crisis(jealousy_threshold),
                trust_crisis(trust_threshold),
                affection_crisis(affection_threshold),
            ],
        }
    }

    pub fn validate(&self, declared: &BTreeSet<String>) -> SimResult<()> {
        const SECTION: &str = "crisis";
        if !self.enabled {
            return Ok(());
        }
        if self.check_interval_secs == 0 {
            return Err(SimError::invalid(SECTION, "check interval must be > 0"));
        }
        if self.max_active == 0 {
            return Err(SimError::invalid(SECTION, "max_active must be at least 1"));
        }
        if self.recovery_bonus < 1.0 {
            return Err(SimError::invalid(
                SECTION,
                format!("recovery bonus must be >= 1.0, got {}", self.recovery_bonus),
            ));
        }
        check_probability(SECTION, "ongoing_event_chance", self.ongoing_event_chance)?;
        let mut seen = BTreeSet::new();
        for def in &self.definitions {
            let ctx = format!("crisis '{}'", def.name);
            if !seen.insert(def.name.as_str()) {
                return Err(SimError::invalid(SECTION, format!("duplicate {ctx}")));
            }
            require_stat(SECTION, &ctx, &def.stat, declared)?;
            if def.severity_scale <= 0.0 {
                return Err(SimError::invalid(SECTION, format!("{ctx} severity scale must be > 0")));
            }
            check_effect_stats(SECTION, &ctx, &def.penalties, declared)?;
            check_effect_stats(SECTION, &ctx, &def.recovery.stat_bonuses, declared)?;
            for stat in def.recovery.required_stats.keys() {
                require_stat(SECTION, &ctx, stat, declared)?;
            }
            check_duration(SECTION, &ctx, def.recovery.time_requirement_secs)?;
        }
        Ok(())
    }
}

fn jealousy_crisis(threshold: f64) -> CrisisDefinition {
    CrisisDefinition {
        name: "jealousy_crisis".into(),
        description: "High jealousy is causing relationship strain".into(),
        stat: "jealousy".into(),
        direction: CrisisDirection::Above,
        threshold,
        severity_scale: 20.0,
        trigger_cause: "jealousy_threshold_exceeded".into(),
        penalties: [
            ("trust".to_string(), -0.5),
            ("affection".to_string(), -0.3),
            ("happiness".to_string(), -0.8),
        ]
        .into(),
        recovery: RecoveryConfig {
            required_interactions: [
                ("apology".to_string(), 2),
                ("deep_conversation".to_string(), 1),
                ("give_gift".to_string(), 1),
            ]
            .into(),
            required_stats: [("jealousy".to_string(), StatRange::at_most(60.0))].into(),
            time_requirement_secs: 30 * 60,
            forgiveness_responses: vec![
                "I... I'm sorry for being so jealous. Can you forgive me?".into(),
                "I realize I was being unreasonable. I trust you...".into(),
                "Thank you for being patient with me. I feel better now.".into(),
            ],
            recovery_animations: vec!["shy".into(), "blushing".into(), "happy".into()],
            stat_bonuses: [
                ("trust".to_string(), 10.0),
                ("affection".to_string(), 5.0),
                ("intimacy".to_string(), 3.0),
            ]
            .into(),
        },
        onset_responses: vec![
            "I'm feeling so jealous right now... Why aren't you spending time with me?".into(),
            "These jealous feelings are overwhelming me...".into(),
        ],
        onset_animations: vec!["jealous".into()],
        ongoing_responses: vec![
            "I can't stop these jealous thoughts...".into(),
            "Are you sure you only care about me?".into(),
            "I feel so insecure right now...".into(),
        ],
        ongoing_animations: vec!["jealous".into(), "sad".into()],
    }
}

fn trust_crisis(threshold: f64) -> CrisisDefinition {
    CrisisDefinition {
        name: "trust_crisis".into(),
        description: "Low trust is damaging the relationship".into(),
        stat: "trust".into(),
        direction: CrisisDirection::Below,
        threshold,
        severity_scale: 15.0,
        trigger_cause: "trust_threshold_breached".into(),
        penalties: [
            ("affection".to_string(), -0.4),
            ("intimacy".to_string(), -0.6),
            ("happiness".to_string(), -0.3),
        ]
        .into(),
        recovery: RecoveryConfig {
            required_interactions: [
                ("deep_conversation".to_string(), 3),
                ("compliment".to_string(), 5),
            ]
            .into(),
            required_stats: [("trust".to_string(), StatRange::at_least(25.0))].into(),
            time_requirement_secs: 45 * 60,
            forgiveness_responses: vec![
                "I'm starting to trust you again... Thank you for being patient.".into(),
                "Your consistency has shown me I can rely on you.".into(),
                "I feel safe with you again... Let's rebuild together.".into(),
            ],
            recovery_animations: vec!["romantic_idle".into(), "happy".into(), "blushing".into()],
            stat_bonuses: [
                ("trust".to_string(), 15.0),
                ("affection".to_string(), 8.0),
                ("happiness".to_string(), 10.0),
            ]
            .into(),
        },
        onset_responses: vec![
            "I'm starting to doubt... Can I really trust you?".into(),
            "My trust in you is shaken...".into(),
        ],
        onset_animations: vec!["sad".into()],
        ongoing_responses: vec![
            "I'm having trouble trusting you right now...".into(),
            "I need to feel safe again...".into(),
            "Can you show me I can rely on you?".into(),
        ],
        ongoing_animations: vec!["sad".into(), "shy".into()],
    }
}

fn affection_crisis(threshold: f64) -> CrisisDefinition {
    CrisisDefinition {
        name: "affection_crisis".into(),
        description: "The relationship is at risk due to lack of affection".into(),
        stat: "affection".into(),
        direction: CrisisDirection::Below,
        threshold,
        severity_scale: 10.0,
        trigger_cause: "affection_critically_low".into(),
        penalties: [
            ("trust".to_string(), -0.3),
            ("intimacy".to_string(), -0.8),
            ("happiness".to_string(), -1.0),
        ]
        .into(),
        recovery: RecoveryConfig {
            required_interactions: [
                ("give_gift".to_string(), 2),
                ("compliment".to_string(), 4),
                ("romantic_gesture".to_string(), 1),
                ("deep_conversation".to_string(), 2),
            ]
            .into(),
            required_stats: [("affection".to_string(), StatRange::at_least(20.0))].into(),
            time_requirement_secs: 60 * 60,
            forgiveness_responses: vec![
                "I... I thought we were drifting apart. Thank you for fighting for us.".into(),
                "You've shown me that you really do care. I feel the love again.".into(),
                "This means everything to me. Let's never let our love fade again.".into(),
            ],
            recovery_animations: vec![
                "heart_eyes".into(),
                "excited_romance".into(),
                "romantic_idle".into(),
            ],
            stat_bonuses: [
                ("affection".to_string(), 20.0),
                ("trust".to_string(), 12.0),
                ("intimacy".to_string(), 15.0),
                ("happiness".to_string(), 15.0),
            ]
            .into(),
        },
        onset_responses: vec![
            "I feel like you don't care about me anymore...".into(),
            "Are we falling out of love? This scares me...".into(),
        ],
        onset_animations: vec!["sad".into(), "crying".into()],
        ongoing_responses: vec![
            "I feel like we're growing apart...".into(),
            "Do you still care about me?".into(),
            "I miss how close we used to be...".into(),
        ],
        ongoing_animations: vec!["sad".into(), "lonely".into()],
    }
}

// ── Progression ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LevelConfig {
    pub name: String,
    /// `age` in seconds plus stat minimums.
    #[serde(default)]
    pub requirement: BTreeMap<String, i64>,
    #[serde(default = "default_level_size")]
    pub size: u32,
    #[serde(default)]
    pub animations: BTreeMap<String, String>,
}

fn default_level_size() -> u32 { 128 }

/// Per-stat achievement criteria. Under the special key `maintainAbove`
/// only `duration` (seconds) is meaningful.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StatCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, rename = "maintainAbove", skip_serializing_if = "Option::is_none")]
    pub maintain_above: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl StatCriteria {
    pub fn holds(&self, value: f64) -> bool {
        self.maintain_above.map_or(true, |t| value >= t)
            && self.min.map_or(true, |t| value >= t)
            && self.max.map_or(true, |t| value <= t)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AchievementReward {
    /// Permanent increases to both max and current.
    #[serde(default)]
    pub stat_boosts: Effects,
    #[serde(default)]
    pub animations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AchievementConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub requirement: BTreeMap<String, StatCriteria>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<AchievementReward>,
}

impl AchievementConfig {
    /// Sustained-duration requirement in whole seconds; 0 means instant.
    pub fn required_secs(&self) -> u64 {
        self.requirement
            .get(MAINTAIN_ABOVE_KEY)
            .and_then(|c| c.duration)
            .map_or(0, |d| d.max(0.0) as u64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressionConfig {
    pub levels: Vec<LevelConfig>,
    #[serde(default)]
    pub achievements: Vec<AchievementConfig>,
}

impl ProgressionConfig {
    pub fn validate(&self, declared: &BTreeSet<String>) -> SimResult<()> {
        const SECTION: &str = "progression";
        let first = self
            .levels
            .first()
            .ok_or_else(|| SimError::invalid(SECTION, "must have at least one level"))?;
        if first.requirement.get(AGE_KEY).copied().unwrap_or(0) != 0 {
            return Err(SimError::invalid(SECTION, "first level must have age requirement of 0"));
        }
        let mut names = BTreeSet::new();
        for level in &self.levels {
            let ctx = format!("level '{}'", level.name);
            if level.name.is_empty() {
                return Err(SimError::invalid(SECTION, "level name cannot be empty"));
            }
            if !names.insert(level.name.as_str()) {
                return Err(SimError::invalid(SECTION, format!("duplicate {ctx}")));
            }
            if !(32..=1024).contains(&level.size) {
                return Err(SimError::invalid(
                    SECTION,
                    format!("{ctx} size must be 32-1024 pixels, got {}", level.size),
                ));
            }
            for stat in level.requirement.keys().filter(|k| k.as_str() != AGE_KEY) {
                require_stat(SECTION, &ctx, stat, declared)?;
            }
        }
        for achievement in &self.achievements {
            let ctx = format!("achievement '{}'", achievement.name);
            if achievement.name.is_empty() {
                return Err(SimError::invalid(SECTION, "achievement name cannot be empty"));
            }
            if achievement.requirement.is_empty() {
                return Err(SimError::invalid(SECTION, format!("{ctx} must have at least one requirement")));
            }
            for stat in achievement.requirement.keys().filter(|k| k.as_str() != MAINTAIN_ABOVE_KEY) {
                require_stat(SECTION, &ctx, stat, declared)?;
            }
            check_duration(SECTION, &ctx, achievement.required_secs())?;
            if let Some(reward) = &achievement.reward {
                check_effect_stats(SECTION, &ctx, &reward.stat_boosts, declared)?;
            }
        }
        Ok(())
    }
}

// ── Aggregate ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CompanionConfig {
    pub stats: BTreeMap<String, StatConfig>,
    pub game_rules: GameRules,
    pub interactions: BTreeMap<String, InteractionConfig>,
    pub random_events: Vec<RandomEventConfig>,
    pub romance_events: Vec<RandomEventConfig>,
    /// `None` for companions without romance features.
    pub personality: Option<Personality>,
    pub jealousy: JealousyConfig,
    pub compatibility: CompatibilityConfig,
    pub crisis: CrisisConfig,
    pub progression: Option<ProgressionConfig>,
}

impl CompanionConfig {
    /// Load from a data directory. Only `stats.json` is mandatory.
    /// In tests, use CompanionConfig::default_test().
    pub fn load(data_dir: &str) -> anyhow::Result<Self> {
        let dir = Path::new(data_dir);

        let stats_file: StatsFile = read_json(&dir.join("stats.json"))?;
        let interactions = read_optional::<InteractionsFile>(&dir.join("interactions.json"))?
            .map(|f| f.interactions)
            .unwrap_or_default();
        let random_events = read_optional::<EventsFile>(&dir.join("events/random_events.json"))?
            .map(|f| f.events)
            .unwrap_or_default();
        let romance_events = read_optional::<EventsFile>(&dir.join("events/romance_events.json"))?
            .map(|f| f.events)
            .unwrap_or_default();
        let personality = read_optional::<Personality>(&dir.join("romance/personality.json"))?;
        let progression = read_optional::<ProgressionConfig>(&dir.join("progression/progression.json"))?;

        let mut config = Self {
            stats: stats_file.stats,
            game_rules: stats_file.game_rules,
            interactions,
            random_events,
            romance_events,
            personality: None,
            jealousy: JealousyConfig::disabled(),
            compatibility: CompatibilityConfig::disabled(),
            crisis: CrisisConfig::disabled(),
            progression,
        };
        config.set_personality(personality);
        Ok(config)
    }

    /// Install (or clear) the personality and re-derive the romance systems.
    pub fn set_personality(&mut self, personality: Option<Personality>) {
        match &personality {
            Some(p) => {
                self.jealousy = JealousyConfig::from_personality(p);
                self.compatibility = CompatibilityConfig::from_personality(p);
                self.crisis = CrisisConfig::from_personality(p);
            }
            None => {
                self.jealousy = JealousyConfig::disabled();
                self.compatibility = CompatibilityConfig::disabled();
                self.crisis = CrisisConfig::disabled();
            }
        }
        self.personality = personality;
    }

    pub fn has_romance_features(&self) -> bool {
        self.personality.is_some() || !self.romance_events.is_empty()
    }

    pub fn declared_stats(&self) -> BTreeSet<String> {
        self.stats.keys().cloned().collect()
    }

    /// Check every section. Any failure prevents the engine from being built.
    pub fn validate(&self) -> SimResult<()> {
        if self.stats.is_empty() {
            return Err(SimError::invalid("stats", "at least one stat must be declared"));
        }
        for (name, stat) in &self.stats {
            validate_stat(name, stat)?;
        }
        if self.game_rules.stats_decay_interval_secs == 0
            || self.game_rules.event_check_interval_secs == 0
        {
            return Err(SimError::invalid("game_rules", "intervals must be > 0"));
        }

        let declared = self.declared_stats();
        for (name, interaction) in &self.interactions {
            let ctx = format!("interaction '{name}'");
            check_effect_stats("interactions", &ctx, &interaction.effects, &declared)?;
            for stat in interaction.requirements.keys() {
                require_stat("interactions", &ctx, stat, &declared)?;
            }
            check_cooldown("interactions", &ctx, interaction.cooldown_secs)?;
        }
        validate_events("random_events", &self.random_events, &declared)?;
        validate_events("romance_events", &self.romance_events, &declared)?;
        if let Some(p) = &self.personality {
            p.validate()?;
        }
        self.jealousy.validate(&self.stats)?;
        self.compatibility.validate()?;
        self.crisis.validate(&declared)?;
        if let Some(progression) = &self.progression {
            progression.validate(&declared)?;
        }
        Ok(())
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        let stat = |initial: f64, rate: f64, critical: f64| StatConfig {
            initial,
            max: 100.0,
            degradation_rate: rate,
            critical_threshold: critical,
        };
        let stats: BTreeMap<String, StatConfig> = [
            ("hunger".to_string(), stat(80.0, 1.0, 20.0)),
            ("happiness".to_string(), stat(70.0, 0.5, 15.0)),
            ("health".to_string(), stat(90.0, 0.2, 10.0)),
            ("energy".to_string(), stat(75.0, 0.8, 15.0)),
            ("affection".to_string(), stat(40.0, 0.0, 10.0)),
            ("trust".to_string(), stat(40.0, 0.0, 15.0)),
            ("intimacy".to_string(), stat(10.0, 0.0, 0.0)),
            ("jealousy".to_string(), stat(0.0, 0.0, 0.0)),
        ]
        .into();

        let interaction = |effects: &[(&str, f64)], cooldown_secs: u64| InteractionConfig {
            effects: effects.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            requirements: BTreeMap::new(),
            cooldown_secs,
            animations: vec!["happy".into()],
            responses: vec!["Thank you!".into()],
        };
        let mut interactions: BTreeMap<String, InteractionConfig> = [
            ("feed".to_string(), interaction(&[("hunger", 25.0), ("happiness", 5.0)], 30)),
            ("pet".to_string(), interaction(&[("happiness", 5.0)], 10)),
            ("compliment".to_string(), interaction(&[("affection", 5.0), ("happiness", 3.0)], 30)),
            ("apology".to_string(), interaction(&[("jealousy", -10.0), ("trust", 2.0)], 60)),
            ("deep_conversation".to_string(), interaction(&[("trust", 5.0), ("intimacy", 3.0)], 120)),
            ("give_gift".to_string(), interaction(&[("affection", 8.0), ("happiness", 10.0)], 300)),
            ("romantic_gesture".to_string(), interaction(&[("affection", 10.0), ("intimacy", 5.0)], 600)),
        ]
        .into();
        let mut play = interaction(&[("happiness", 15.0), ("energy", -10.0)], 45);
        play.requirements.insert("energy".into(), StatRange::at_least(20.0));
        interactions.insert("play".into(), play);

        let random_events = vec![
            RandomEventConfig {
                name: "sunny_day".into(),
                description: "The sun came out".into(),
                probability: 0.1,
                effects: [("happiness".to_string(), 10.0)].into(),
                animations: vec!["happy".into()],
                responses: vec!["What a beautiful day!".into()],
                cooldown_secs: 600,
                duration_secs: 5,
                conditions: EventConditions::new(),
            },
            RandomEventConfig {
                name: "feeling_lonely".into(),
                description: "Nobody has been around".into(),
                probability: 0.05,
                effects: [("happiness".to_string(), -5.0)].into(),
                animations: vec!["sad".into()],
                responses: vec!["I feel a bit lonely...".into()],
                cooldown_secs: 900,
                duration_secs: 5,
                conditions: [(
                    "happiness".to_string(),
                    [("max".to_string(), 40.0)].into(),
                )]
                .into(),
            },
        ];

        let romance_events = vec![RandomEventConfig {
            name: "sweet_memory".into(),
            description: "Remembering a good moment together".into(),
            probability: 0.05,
            effects: [("affection".to_string(), 3.0)].into(),
            animations: vec!["blushing".into()],
            responses: vec!["I was just thinking about you...".into()],
            cooldown_secs: 1800,
            duration_secs: 5,
            conditions: [
                ("affection".to_string(), [("min".to_string(), 30.0)].into()),
                (
                    INTERACTION_COUNT_KEY.to_string(),
                    [("total_min".to_string(), 3.0)].into(),
                ),
            ]
            .into(),
        }];

        let personality = Personality {
            traits: [
                ("jealousy_prone".to_string(), 0.5),
                ("trust_difficulty".to_string(), 0.5),
                ("affection_responsiveness".to_string(), 0.5),
            ]
            .into(),
            compatibility: BTreeMap::new(),
        };

        let level = |name: &str, age: i64, size: u32| LevelConfig {
            name: name.into(),
            requirement: [(AGE_KEY.to_string(), age)].into(),
            size,
            animations: BTreeMap::new(),
        };
        let progression = ProgressionConfig {
            levels: vec![
                level("Baby", 0, 64),
                level("Child", 3_600, 96),
                level("Adult", 86_400, 128),
            ],
            achievements: vec![
                AchievementConfig {
                    name: "Happy Camper".into(),
                    description: None,
                    requirement: [
                        (
                            "happiness".to_string(),
                            StatCriteria { min: Some(90.0), ..StatCriteria::default() },
                        ),
                        (
                            MAINTAIN_ABOVE_KEY.to_string(),
                            StatCriteria { duration: Some(60.0), ..StatCriteria::default() },
                        ),
                    ]
                    .into(),
                    reward: Some(AchievementReward {
                        stat_boosts: [("happiness".to_string(), 10.0)].into(),
                        ..AchievementReward::default()
                    }),
                },
                AchievementConfig {
                    name: "Well Fed".into(),
                    description: Some("Kept your companion well-fed!".into()),
                    requirement: [(
                        "hunger".to_string(),
                        StatCriteria { min: Some(95.0), ..StatCriteria::default() },
                    )]
                    .into(),
                    reward: None,
                },
            ],
        };

        let mut config = Self {
            stats,
            game_rules: GameRules::default(),
            interactions,
            random_events,
            romance_events,
            personality: None,
            jealousy: JealousyConfig::disabled(),
            compatibility: CompatibilityConfig::disabled(),
            crisis: CrisisConfig::disabled(),
            progression: Some(progression),
        };
        config.set_personality(Some(personality));
        config
    }
}

// ── Validation helpers ─────────────────────────────────────────────

fn validate_stat(name: &str, stat: &StatConfig) -> SimResult<()> {
    let fail = |reason: String| Err(SimError::invalid("stats", format!("stat '{name}': {reason}")));
    if stat.max <= 0.0 {
        return fail(format!("max value must be positive, got {}", stat.max));
    }
    if !(0.0..=stat.max).contains(&stat.initial) {
        return fail(format!("initial {} must be within [0, {}]", stat.initial, stat.max));
    }
    if stat.degradation_rate < 0.0 {
        return fail(format!("degradation rate cannot be negative, got {}", stat.degradation_rate));
    }
    if !(0.0..=stat.max).contains(&stat.critical_threshold) {
        return fail(format!(
            "critical threshold {} must be within [0, {}]",
            stat.critical_threshold, stat.max
        ));
    }
    Ok(())
}

fn validate_events(
    section: &str,
    events: &[RandomEventConfig],
    declared: &BTreeSet<String>,
) -> SimResult<()> {
    for event in events {
        let ctx = format!("event '{}'", event.name);
        check_probability(section, &ctx, event.probability)?;
        check_cooldown(section, &ctx, event.cooldown_secs)?;
        check_duration(section, &ctx, event.duration_secs)?;
        check_effect_stats(section, &ctx, &event.effects, declared)?;
        for key in event.conditions.keys() {
            if key != INTERACTION_COUNT_KEY && key != MEMORY_COUNT_KEY {
                require_stat(section, &ctx, key, declared)?;
            }
        }
    }
    Ok(())
}

fn check_probability(section: &str, context: &str, p: f64) -> SimResult<()> {
    if (0.0..=1.0).contains(&p) {
        Ok(())
    } else {
        Err(SimError::invalid(section, format!("{context} probability must be in [0, 1], got {p}")))
    }
}

fn check_cooldown(section: &str, context: &str, secs: u64) -> SimResult<()> {
    if secs <= MAX_COOLDOWN_SECS {
        Ok(())
    } else {
        Err(SimError::invalid(section, format!("{context} cooldown {secs}s exceeds {MAX_COOLDOWN_SECS}s")))
    }
}

fn check_duration(section: &str, context: &str, secs: u64) -> SimResult<()> {
    if secs <= MAX_DURATION_SECS {
        Ok(())
    } else {
        Err(SimError::invalid(section, format!("{context} duration {secs}s exceeds {MAX_DURATION_SECS}s")))
    }
}

fn check_effect_stats(
    section: &str,
    context: &str,
    effects: &Effects,
    declared: &BTreeSet<String>,
) -> SimResult<()> {
    effects
        .keys()
        .try_for_each(|stat| require_stat(section, context, stat, declared))
}

fn require_stat(section: &str, context: &str, stat: &str, declared: &BTreeSet<String>) -> SimResult<()> {
    if declared.contains(stat) {
        Ok(())
    } else {
        Err(SimError::UnknownStat {
            context: format!("{section}: {context}"),
            stat: stat.to_string(),
        })
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Cannot read {}: {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| anyhow::anyhow!("Cannot parse {}: {e}", path.display()))
}

fn read_optional<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    read_json(path).map(Some)
}

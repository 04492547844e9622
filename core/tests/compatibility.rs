//! Compatibility analyzer tests.
//!
//! Tests cover: consistency and variety scoring, modifier minting from
//! behaviour, modifier decay and expiry, and the disabled state.

use chrono::{DateTime, Duration, TimeZone, Utc};
use companion_core::{
    compatibility::{
        consistency_score, variety_score, CompatibilityAnalyzer, PlayerBehaviorPattern,
        RESPONSIVENESS_MODIFIER,
    },
    config::{CompanionConfig, CompatibilityConfig},
    history::InteractionLog,
};
use std::collections::BTreeMap;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Ten interactions alternating feed/pet, one minute apart.
fn alternating_log() -> InteractionLog {
    let log = InteractionLog::new();
    for i in 0..10 {
        let kind = if i % 2 == 0 { "feed" } else { "pet" };
        log.record(kind, t0() + Duration::minutes(i));
    }
    log
}

fn analyzer() -> CompatibilityAnalyzer {
    CompatibilityAnalyzer::new(CompanionConfig::default_test().compatibility)
}

#[test]
fn regular_alternating_play_scores_high() {
    use companion_core::history::HistoryReader;
    let history = alternating_log().interaction_history();
    assert!((consistency_score(&history) - 1.0).abs() < 1e-9);
    assert!((variety_score(&history) - 1.0).abs() < 1e-9);
}

#[test]
fn scores_on_sparse_history() {
    let empty: BTreeMap<String, Vec<DateTime<Utc>>> = BTreeMap::new();
    assert_eq!(consistency_score(&empty), 0.0);
    assert_eq!(variety_score(&empty), 0.0);

    let two: BTreeMap<_, _> = [("feed".to_string(), vec![t0(), t0() + Duration::minutes(1)])].into();
    assert_eq!(consistency_score(&two), 0.5, "too few interactions to judge");
    assert_eq!(variety_score(&two), 0.0, "a single type has no variety");
}

#[test]
fn irregular_gaps_lower_consistency() {
    let history: BTreeMap<_, _> = [(
        "feed".to_string(),
        vec![t0(), t0() + Duration::minutes(1), t0() + Duration::minutes(120)],
    )]
    .into();
    let score = consistency_score(&history);
    assert!(score < 0.1, "stddev of 59.5 minutes should nearly zero the score, got {score}");
}

/// Adaptation strength 0.4 from affection_responsiveness 0.5.
#[test]
fn analysis_mints_all_three_modifiers() {
    let compat = analyzer();
    assert!((compat.adaptation_strength() - 0.4).abs() < 1e-9);

    let active = compat.force_analysis(t0() + Duration::minutes(10), &alternating_log());
    assert_eq!(active.len(), 3);
    assert!((compat.modifier_value("consistent_interaction_bonus") - 1.12).abs() < 1e-9);
    assert!((compat.modifier_value("variety_preference_bonus") - 1.10).abs() < 1e-9);
    assert!((compat.modifier_value(RESPONSIVENESS_MODIFIER) - 1.08).abs() < 1e-9);

    let pattern = compat.get_player_pattern().expect("enabled");
    assert_eq!(pattern.total_interactions, 10);
    assert!((pattern.interactions_per_minute - 1.0).abs() < 1e-9);
    assert!((pattern.preferred_time_gaps["feed"] - 2.0).abs() < 1e-9);
}

#[test]
fn analysis_respects_interval() {
    let compat = analyzer();
    let log = alternating_log();
    let first = compat.refresh(t0() + Duration::minutes(10), &log);
    assert_eq!(first.added.len(), 3);

    let soon = compat.refresh(t0() + Duration::minutes(11), &log);
    assert!(soon.added.is_empty(), "analysis runs once per 300s");
    assert_eq!(soon.active.len(), 3);
}

#[test]
fn modifiers_decay_and_expire() {
    let compat = analyzer();
    let log = alternating_log();
    compat.force_analysis(t0() + Duration::minutes(10), &log);

    // After five hours responsiveness has faded below 1.01 and, with the
    // interaction rate now far below threshold, is not minted again.
    let later = compat.refresh(t0() + Duration::minutes(10) + Duration::hours(5), &log);
    assert!(later.expired.contains(&RESPONSIVENESS_MODIFIER.to_string()));
    assert_eq!(compat.modifier_value(RESPONSIVENESS_MODIFIER), 1.0);
    assert!(
        later.added.iter().any(|m| m.stat_name == "consistent_interaction_bonus"),
        "still-consistent players earn a fresh modifier"
    );
}

#[test]
fn adaptation_strength_is_clamped() {
    let compat = analyzer();
    compat.set_adaptation_strength(3.0);
    assert_eq!(compat.adaptation_strength(), 1.0);
    compat.set_adaptation_strength(-1.0);
    assert_eq!(compat.adaptation_strength(), 0.0);
}

#[test]
fn disabled_analyzer_reports_nothing() {
    let compat = CompatibilityAnalyzer::new(CompatibilityConfig::disabled());
    assert!(compat.force_analysis(t0(), &alternating_log()).is_empty());
    assert!(compat.get_player_pattern().is_none());
    assert_eq!(compat.modifier_value(RESPONSIVENESS_MODIFIER), 1.0);
    let insights = compat.get_compatibility_insights(t0());
    assert_eq!(insights["enabled"], false);
    assert_eq!(insights.len(), 1);
}

#[test]
fn empty_history_produces_no_modifiers() {
    let compat = analyzer();
    assert!(compat.force_analysis(t0(), &InteractionLog::new()).is_empty());
    assert_eq!(
        compat.get_player_pattern(),
        Some(PlayerBehaviorPattern { last_analysis: Some(t0()), ..PlayerBehaviorPattern::default() })
    );
}

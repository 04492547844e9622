//! Stat store tests.
//!
//! Tests cover: clamping on every mutation, requirement checks,
//! degradation and critical transitions, mood derivation, permanent
//! boosts and validation of restored data.

use companion_core::{
    config::CompanionConfig,
    error::SimError,
    stats::{mood_state, Stat, StatReader, StatStore, StatWriter},
    types::{Effects, StatMinimums, StatRange},
};
use std::collections::BTreeMap;

fn store() -> StatStore {
    StatStore::from_config(&CompanionConfig::default_test().stats)
}

fn effects(pairs: &[(&str, f64)]) -> Effects {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

#[test]
fn effects_are_clamped_to_range() {
    let stats = store();
    stats.apply_effects(&effects(&[("hunger", 500.0), ("happiness", -500.0)]));
    assert_eq!(stats.get_stat("hunger"), 100.0);
    assert_eq!(stats.get_stat("happiness"), 0.0);
}

#[test]
fn unknown_stats_are_ignored() {
    let stats = store();
    let before = stats.get_stats();
    stats.apply_effects(&effects(&[("charisma", 10.0)]));
    assert_eq!(stats.get_stats(), before, "unknown stat must not change anything");
    assert_eq!(stats.get_stat("charisma"), 0.0);
    assert_eq!(stats.stat_max("charisma"), 0.0);
}

#[test]
fn requirements_need_every_stat_present_and_high_enough() {
    let stats = store();
    let mut req = StatMinimums::new();
    req.insert("hunger".into(), 80.0);
    assert!(stats.can_satisfy_requirements(&req), "value equal to minimum passes");

    req.insert("energy".into(), 76.0);
    assert!(!stats.can_satisfy_requirements(&req));

    let missing: StatMinimums = [("charisma".to_string(), 0.0)].into();
    assert!(!stats.can_satisfy_requirements(&missing), "missing stat fails");
}

#[test]
fn ranges_check_both_bounds() {
    let stats = store();
    let ranges: BTreeMap<String, StatRange> = [
        ("hunger".to_string(), StatRange { min: Some(50.0), max: Some(80.0) }),
        ("jealousy".to_string(), StatRange::at_most(10.0)),
    ]
    .into();
    assert!(stats.can_satisfy_ranges(&ranges));

    stats.set_stat("jealousy", 11.0);
    assert!(!stats.can_satisfy_ranges(&ranges));
}

#[test]
fn degrade_reports_newly_critical_stats() {
    let stats = store();
    let outcome = stats.degrade(61.0);

    assert_eq!(stats.get_stat("hunger"), 19.0);
    assert_eq!(outcome.newly_critical, vec!["hunger".to_string()]);
    assert!(outcome.mood_states.contains(&"hungry".to_string()));
    assert_eq!(stats.get_stat("affection"), 40.0, "zero-rate stats never decay");

    let again = stats.degrade(1.0);
    assert!(
        !again.newly_critical.contains(&"hunger".to_string()),
        "already-critical stats are not reported twice"
    );
}

#[test]
fn degrade_floors_at_zero() {
    let stats = store();
    stats.degrade(10_000.0);
    for name in ["hunger", "happiness", "health", "energy"] {
        assert_eq!(stats.get_stat(name), 0.0, "{name} should floor at 0");
    }
    assert!(stats.critical_states().contains(&"health".to_string()));
}

#[test]
fn mood_follows_average_percentage() {
    let stats = store();
    // 80 + 70 + 90 + 75 + 40 + 40 + 10 + 0 = 405 over 8 stats.
    assert!((stats.overall_mood() - 50.625).abs() < 1e-9);
    assert_eq!(stats.mood_category(), "neutral");

    for name in ["hunger", "happiness", "health", "energy", "affection", "trust", "intimacy", "jealousy"] {
        stats.set_stat(name, 100.0);
    }
    assert_eq!(stats.mood_category(), "happy");
    assert_eq!(StatStore::new().overall_mood(), 50.0);
}

#[test]
fn boost_raises_max_and_current() {
    let stats = store();
    stats.boost_stat("happiness", 10.0);
    assert_eq!(stats.stat_max("happiness"), 110.0);
    assert_eq!(stats.get_stat("happiness"), 80.0);
    assert!((stats.stat_percentage("happiness") - 80.0 / 110.0 * 100.0).abs() < 1e-9);
}

#[test]
fn restore_rejects_out_of_range_values() {
    let stats = store();
    let mut saved = stats.snapshot_full();
    saved.insert(
        "hunger".into(),
        Stat { current: 150.0, max: 100.0, degradation_rate: 1.0, critical_threshold: 20.0 },
    );
    let err = stats.restore(saved).unwrap_err();
    assert!(matches!(err, SimError::InvalidConfig { .. }), "got {err}");
    assert_eq!(stats.get_stat("hunger"), 80.0, "failed restore leaves state untouched");
    assert!(stats.validate().is_ok());
}

#[test]
fn mood_names_for_critical_stats() {
    assert_eq!(mood_state("hunger"), Some("hungry"));
    assert_eq!(mood_state("energy"), Some("tired"));
    assert_eq!(mood_state("trust"), None);

    let stats = store();
    stats.set_stat("health", 5.0);
    stats.set_stat("trust", 0.0);
    let outcome = stats.degrade(0.5);
    assert_eq!(outcome.mood_states, vec!["sick".to_string()], "trust has no mood name");
}

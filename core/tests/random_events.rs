//! Random and romance event engine tests.
//!
//! Tests cover: check interval gating, per-event cooldowns, stat and
//! history conditions, first-satisfying-trigger-wins ordering, and
//! effects being applied by the engine itself.

use chrono::{DateTime, Duration, TimeZone, Utc};
use companion_core::{
    config::{CompanionConfig, EventConditions, MEMORY_COUNT_KEY},
    history::{InteractionLog, RomanceMemory},
    rng::SequenceRng,
    random_events::RandomEventEngine,
    stats::{StatReader, StatStore},
    subsystem::CompanionSubsystem,
    trigger::conditions_met,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn setup() -> (RandomEventEngine, StatStore, InteractionLog) {
    let config = CompanionConfig::default_test();
    let engine = RandomEventEngine::random(config.random_events, Duration::seconds(30));
    (engine, StatStore::from_config(&config.stats), InteractionLog::new())
}

#[test]
fn first_check_is_immediate_and_applies_effects() {
    let (engine, stats, history) = setup();
    let mut rng = SequenceRng::constant(0.0);

    let fired = engine.check(t0(), &stats, &history, &mut rng).expect("sunny_day fires");
    assert_eq!(fired.name, "sunny_day");
    assert_eq!(fired.duration, Duration::seconds(5));
    assert_eq!(stats.get_stat("happiness"), 80.0, "effects applied by the engine");
    assert_eq!(engine.last_check(), Some(t0()));
}

#[test]
fn checks_are_gated_by_interval() {
    let (engine, stats, history) = setup();
    let mut rng = SequenceRng::constant(1.0);

    assert!(engine.check(t0(), &stats, &history, &mut rng).is_none());
    let consumed = rng.consumed();
    assert!(engine.check(t0() + Duration::seconds(10), &stats, &history, &mut rng).is_none());
    assert_eq!(rng.consumed(), consumed, "no draws before the interval elapses");
    assert_eq!(engine.last_check(), Some(t0()));
}

#[test]
fn cooldown_and_conditions_block_triggers() {
    let (engine, stats, history) = setup();
    let mut rng = SequenceRng::constant(0.0);

    assert!(engine.check(t0(), &stats, &history, &mut rng).is_some());
    // sunny_day cooling down, feeling_lonely needs happiness <= 40.
    assert!(engine.check(t0() + Duration::seconds(30), &stats, &history, &mut rng).is_none());

    stats.set_stat("happiness", 30.0);
    let fired = engine
        .check(t0() + Duration::seconds(60), &stats, &history, &mut rng)
        .expect("feeling_lonely fires once its condition holds");
    assert_eq!(fired.name, "feeling_lonely");
    assert_eq!(stats.get_stat("happiness"), 25.0);

    // Exactly at the end of the cooldown the trigger is ready again.
    let ready_at = t0() + Duration::seconds(600);
    assert_eq!(
        engine.check(ready_at, &stats, &history, &mut rng).map(|e| e.name),
        Some("sunny_day".to_string())
    );
}

#[test]
fn only_the_first_satisfying_trigger_fires() {
    let (engine, stats, history) = setup();
    stats.set_stat("happiness", 30.0);
    let mut rng = SequenceRng::constant(0.0);

    let fired = engine.check(t0(), &stats, &history, &mut rng).expect("one event");
    assert_eq!(fired.name, "sunny_day");
    let counts = engine.fire_counts();
    assert_eq!(counts.get("sunny_day"), Some(&1));
    assert_eq!(counts.get("feeling_lonely"), None);
}

#[test]
fn failed_rolls_fire_nothing() {
    let (engine, stats, history) = setup();
    let mut rng = SequenceRng::constant(0.5);
    assert!(engine.check(t0(), &stats, &history, &mut rng).is_none());
    assert!(engine.fire_counts().is_empty());
    assert_eq!(stats.get_stat("happiness"), 70.0);
}

#[test]
fn romance_events_need_interaction_history() {
    let config = CompanionConfig::default_test();
    let engine = RandomEventEngine::romance(config.romance_events, Duration::seconds(30));
    let stats = StatStore::from_config(&config.stats);
    let history = InteractionLog::new();
    let mut rng = SequenceRng::constant(0.0);

    history.record("feed", t0());
    history.record("pet", t0());
    assert!(engine.check(t0(), &stats, &history, &mut rng).is_none());

    history.record("compliment", t0());
    let fired = engine
        .check(t0() + Duration::seconds(30), &stats, &history, &mut rng)
        .expect("sweet_memory after three interactions");
    assert_eq!(fired.name, "sweet_memory");
    assert_eq!(stats.get_stat("affection"), 43.0);
}

#[test]
fn memory_conditions_count_recent_positive_memories() {
    let stats = StatStore::from_config(&CompanionConfig::default_test().stats);
    let history = InteractionLog::new();
    let now = t0() + Duration::hours(1);
    let conditions: EventConditions = [(
        MEMORY_COUNT_KEY.to_string(),
        [("total_min".to_string(), 1.0), ("recent_positive_min".to_string(), 1.0)].into(),
    )]
    .into();

    assert!(!conditions_met(&conditions, &stats, &history, now));
    history.record_memory(RomanceMemory {
        timestamp:        t0(),
        interaction_type: "compliment".into(),
        stats_before:     [("affection".to_string(), 40.0)].into(),
        stats_after:      [("affection".to_string(), 45.0)].into(),
        response:         String::new(),
    });
    assert!(conditions_met(&conditions, &stats, &history, now));
}

#[test]
fn empty_event_list_disables_engine() {
    let engine = RandomEventEngine::random(Vec::new(), Duration::seconds(30));
    assert!(!engine.is_enabled());
    engine.set_enabled(true);
    assert!(!engine.is_enabled(), "nothing to run without events");
    assert_eq!(engine.get_event_count(), 0);
}

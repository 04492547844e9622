//! Engine tests.
//!
//! Tests cover: build-time validation, subsystem execution order and
//! handles, decay through ticks, pause, and progression events.

use chrono::{DateTime, Duration, TimeZone, Utc};
use companion_core::{
    config::CompanionConfig,
    crisis::CrisisManager,
    engine::CompanionEngine,
    error::SimError,
    event::CompanionEvent,
    jealousy::JealousyEngine,
    rng::SubsystemSlot,
    stats::StatReader,
    subsystem::CompanionSubsystem,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn build(id: &str, seed: u64) -> CompanionEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    CompanionEngine::build(id.to_string(), seed, CompanionConfig::default_test(), t0())
        .expect("build test engine")
}

#[test]
fn invalid_config_fails_build() {
    let mut config = CompanionConfig::default_test();
    config.random_events[0].probability = -0.1;
    let result = CompanionEngine::build("bad".into(), 1, config, t0());
    assert!(matches!(result, Err(SimError::InvalidConfig { .. })));
}

#[test]
fn every_subsystem_registered() {
    let engine = build("handles", 1);
    assert!(engine.decay().is_some());
    assert!(engine.random_events().is_some());
    assert!(engine.romance_events().is_some());
    assert!(engine.jealousy().is_some());
    assert!(engine.compatibility().is_some());
    assert!(engine.crisis().is_some());
    assert!(engine.progression().is_some());

    assert_eq!(engine.random_events().map(|r| r.name()), Some("random_events"));
    assert_eq!(engine.romance_events().map(|r| r.name()), Some("romance_events"));
}

#[test]
fn handle_with_wrong_type_fails() {
    let engine = build("wrong-type", 1);
    assert!(engine.handle::<CrisisManager>(SubsystemSlot::Crisis).is_ok());
    let err = engine
        .handle::<JealousyEngine>(SubsystemSlot::Crisis)
        .err()
        .expect("crisis slot is not a jealousy engine");
    assert!(matches!(err, SimError::SubsystemNotFound { .. }));
}

#[test]
fn missing_progression_is_not_registered() {
    let mut config = CompanionConfig::default_test();
    config.progression = None;
    let engine = CompanionEngine::build("no-prog".into(), 1, config, t0()).unwrap();
    assert!(engine.progression().is_none());
}

#[test]
fn tick_is_bracketed_by_start_and_complete() {
    let mut engine = build("bracket", 1);
    let events = engine.tick(Duration::seconds(10)).unwrap();
    assert_eq!(events.first(), Some(&CompanionEvent::TickStarted { tick: 1 }));
    assert_eq!(events.last(), Some(&CompanionEvent::TickCompleted { tick: 1 }));
    assert_eq!(engine.clock.now, t0() + Duration::seconds(10));
}

#[test]
fn decay_runs_on_its_interval() {
    let mut engine = build("decay", 1);
    let stats = engine.stats();

    engine.tick(Duration::seconds(30)).unwrap();
    assert_eq!(stats.get_stat("hunger"), 80.0, "interval not reached");

    engine.tick(Duration::seconds(30)).unwrap();
    assert_eq!(stats.get_stat("hunger"), 79.0, "one minute at rate 1");
    assert_eq!(engine.decay().map(|d| d.last_decay()), Some(t0() + Duration::seconds(60)));
}

#[test]
fn stat_critical_event_emitted_once() {
    let mut engine = build("critical", 1);
    engine.stats().set_stat("hunger", 20.5);

    let events = engine.tick(Duration::seconds(60)).unwrap();
    let critical: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            CompanionEvent::StatCritical { stat, mood_state, .. } => Some((stat.clone(), mood_state.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(critical, vec![("hunger".to_string(), Some("hungry".to_string()))]);

    let again = engine.tick(Duration::seconds(60)).unwrap();
    assert!(!again.iter().any(|e| matches!(e, CompanionEvent::StatCritical { .. })));
}

#[test]
fn paused_engine_does_not_advance() {
    let mut engine = build("paused", 1);
    engine.pause();
    let events = engine.tick(Duration::seconds(60)).unwrap();
    assert!(events.is_empty());
    assert_eq!(engine.clock.current_tick, 0);
    assert_eq!(engine.clock.now, t0());

    engine.resume();
    assert!(!engine.tick(Duration::seconds(60)).unwrap().is_empty());
    assert_eq!(engine.clock.current_tick, 1);
}

#[test]
fn disabled_subsystem_is_skipped() {
    let mut engine = build("disabled", 1);
    if let Some(decay) = engine.decay() {
        decay.set_enabled(false);
    }
    engine.tick(Duration::minutes(10)).unwrap();
    assert_eq!(engine.stats().get_stat("hunger"), 80.0);
}

#[test]
fn level_up_emitted_after_an_hour() {
    let mut engine = build("level", 1);
    let events = engine.tick(Duration::hours(1)).unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        CompanionEvent::LevelChanged { from, to, .. } if from == "Baby" && to == "Child"
    )));
    assert_eq!(engine.progression().map(|p| p.current_size()), Some(96));
}

#[test]
fn run_ticks_starts_with_run_initialized() {
    let mut engine = build("run", 7);
    let events = engine.run_ticks(3, Duration::seconds(10)).unwrap();
    assert_eq!(
        events.first(),
        Some(&CompanionEvent::RunInitialized { companion_id: "run".into(), seed: 7 })
    );
    let ticks = events
        .iter()
        .filter(|e| matches!(e, CompanionEvent::TickCompleted { .. }))
        .count();
    assert_eq!(ticks, 3);
    assert_eq!(engine.clock.total_play_time, Duration::seconds(30));
}

/// A negative span moves neither the clock nor any subsystem backwards.
#[test]
fn negative_elapsed_is_treated_as_zero() {
    let mut engine = build("backwards", 3);
    engine.tick(Duration::seconds(30)).unwrap();
    engine.tick(Duration::seconds(-120)).unwrap();

    assert_eq!(engine.clock.current_tick, 2);
    assert_eq!(engine.clock.now, t0() + Duration::seconds(30));
    let progression = engine.progression().expect("progression");
    assert_eq!(progression.get_age(), Duration::seconds(30));
    progression.validate().expect("progression state stays valid");

    let mut fresh = build("backwards", 3);
    fresh
        .restore(engine.snapshot())
        .expect("snapshot after a negative tick restores");
    assert_eq!(fresh.snapshot(), engine.snapshot());
}

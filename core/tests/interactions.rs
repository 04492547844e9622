//! Interaction handler tests.
//!
//! Tests cover: rejection paths, effect application, history and
//! romance memory bookkeeping, responsiveness scaling, and crisis
//! recovery driven by player care.

use chrono::{DateTime, Duration, TimeZone, Utc};
use companion_core::{
    config::CompanionConfig,
    engine::CompanionEngine,
    event::{CompanionEvent, EventSource},
    history::HistoryReader,
    stats::StatReader,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn build(id: &str) -> CompanionEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    CompanionEngine::build(id.to_string(), 42, CompanionConfig::default_test(), t0())
        .expect("build test engine")
}

fn rejection(events: &[CompanionEvent]) -> Option<&str> {
    events.iter().find_map(|e| match e {
        CompanionEvent::InteractionRejected { reason, .. } => Some(reason.as_str()),
        _ => None,
    })
}

fn performed_effects(events: &[CompanionEvent]) -> Option<&companion_core::types::Effects> {
    events.iter().find_map(|e| match e {
        CompanionEvent::InteractionPerformed { effects, .. } => Some(effects),
        _ => None,
    })
}

#[test]
fn unknown_interaction_rejected_without_change() {
    let mut engine = build("unknown");
    let before = engine.stats().get_stats();
    let events = engine.perform_interaction("juggle").unwrap();
    assert_eq!(rejection(&events), Some("unknown interaction"));
    assert_eq!(engine.stats().get_stats(), before);
    assert_eq!(engine.history().total_interactions(), 0);
}

#[test]
fn feed_applies_effects_and_records_history() {
    let mut engine = build("feed");
    let events = engine.perform_interaction("feed").unwrap();
    assert!(rejection(&events).is_none());

    let stats = engine.stats();
    assert_eq!(stats.get_stat("hunger"), 100.0, "80 + 25 clamped");
    assert_eq!(stats.get_stat("happiness"), 75.0);

    let history = engine.history();
    assert_eq!(history.interaction_count("feed"), 1);
    assert_eq!(history.memory_count(), 1);
    assert_eq!(history.memories()[0].response, "Thank you!");
    assert_eq!(engine.progression().map(|p| p.interaction_counts()["feed"]), Some(1));
    assert_eq!(engine.last_interaction(), t0());
}

#[test]
fn cooldown_blocks_repeat_until_elapsed() {
    let mut engine = build("cooldown");
    engine.perform_interaction("feed").unwrap();
    let events = engine.perform_interaction("feed").unwrap();
    assert_eq!(rejection(&events), Some("interaction on cooldown"));

    engine.tick(Duration::seconds(30)).unwrap();
    let events = engine.perform_interaction("feed").unwrap();
    assert!(rejection(&events).is_none(), "ready exactly at the cooldown");
}

#[test]
fn unmet_requirements_rejected() {
    let mut engine = build("requirements");
    engine.stats().set_stat("energy", 10.0);
    let events = engine.perform_interaction("play").unwrap();
    assert_eq!(rejection(&events), Some("requirements not met"));
    assert_eq!(engine.stats().get_stat("energy"), 10.0);
}

#[test]
fn no_romance_memory_without_romance_features() {
    let mut config = CompanionConfig::default_test();
    config.romance_events.clear();
    config.set_personality(None);
    let mut engine = CompanionEngine::build("plain".into(), 1, config, t0()).unwrap();
    engine.perform_interaction("pet").unwrap();
    assert_eq!(engine.history().memory_count(), 0);
    assert_eq!(engine.history().interaction_count("pet"), 1);
}

/// Three varied interactions in one minute earn the responsiveness
/// modifier (1 + 0.4 × 0.2) on the first analysis.
#[test]
fn positive_deltas_scaled_by_responsiveness() {
    let mut engine = build("responsive");
    for kind in ["feed", "pet", "compliment"] {
        engine.perform_interaction(kind).unwrap();
    }
    engine.tick(Duration::seconds(60)).unwrap();

    let events = engine.perform_interaction("play").unwrap();
    let effects = performed_effects(&events).expect("play performed");
    assert!((effects["happiness"] - 16.2).abs() < 1e-9);
    assert_eq!(effects["energy"], -10.0, "negative deltas are not scaled");
}

#[test]
fn care_resolves_jealousy_crisis() {
    let mut engine = build("recovery");
    engine.stats().set_stat("jealousy", 90.0);

    let events = engine.tick(Duration::seconds(10)).unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        CompanionEvent::CrisisOpened { name, .. } if name == "jealousy_crisis"
    )));

    for kind in ["apology", "deep_conversation", "give_gift"] {
        engine.perform_interaction(kind).unwrap();
    }
    engine.tick(Duration::seconds(60)).unwrap();
    engine.perform_interaction("apology").unwrap();
    engine.stats().set_stat("jealousy", 50.0);

    let early = engine.perform_interaction("pet").unwrap();
    assert!(!early.iter().any(|e| matches!(e, CompanionEvent::CrisisResolved { .. })));

    for _ in 0..6 {
        engine.tick(Duration::minutes(5)).unwrap();
    }
    let events = engine.perform_interaction("pet").unwrap();
    assert!(events.iter().any(|e| matches!(
        e,
        CompanionEvent::CrisisResolved { name, .. } if name == "jealousy_crisis"
    )));
    let forgiveness = events
        .iter()
        .find(|e| matches!(e, CompanionEvent::Triggered { source: EventSource::CrisisRecovery, .. }))
        .and_then(CompanionEvent::triggered)
        .expect("forgiveness event");
    assert_eq!(forgiveness.name, "jealousy_crisis_recovered");
    assert!(forgiveness.has_responses());
    assert!(engine.crisis().map_or(false, |c| c.get_active_crises().is_empty()));
}

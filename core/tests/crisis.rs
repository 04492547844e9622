//! Crisis manager tests.
//!
//! Tests cover: detection and severity, one new crisis per check,
//! the active-crisis cap, severity-scaled penalties, the ongoing event
//! roll, and the multi-requirement recovery path.

use chrono::{DateTime, Duration, TimeZone, Utc};
use companion_core::{
    config::{CompanionConfig, CrisisConfig},
    crisis::{CrisisManager, MIN_SEVERITY},
    history::InteractionLog,
    rng::SequenceRng,
    stats::{StatReader, StatStore},
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Default personality: jealousy threshold 70, trust 20, affection 15.
fn setup() -> (CrisisManager, StatStore, InteractionLog) {
    let config = CompanionConfig::default_test();
    (
        CrisisManager::new(config.crisis),
        StatStore::from_config(&config.stats),
        InteractionLog::new(),
    )
}

fn quiet() -> SequenceRng {
    SequenceRng::constant(1.0)
}

#[test]
fn breach_opens_crisis_with_scaled_penalties() {
    let (crises, stats, _) = setup();
    stats.set_stat("jealousy", 90.0);

    let out = crises.tick(t0(), &stats, &mut quiet());
    let (crisis, event) = out.opened.expect("jealousy crisis opens");
    assert_eq!(crisis.name, "jealousy_crisis");
    assert_eq!(crisis.severity, 1.0);
    assert_eq!(crisis.trigger_cause, "jealousy_threshold_exceeded");
    assert_eq!(event.duration, Duration::seconds(5));

    // Penalties apply on the opening tick.
    assert!((stats.get_stat("trust") - 39.5).abs() < 1e-9);
    assert!((stats.get_stat("affection") - 39.7).abs() < 1e-9);
    assert!((stats.get_stat("happiness") - 69.2).abs() < 1e-9);
    assert!(crises.has_crisis("jealousy_crisis"));
}

#[test]
fn severity_at_threshold_has_a_floor() {
    let (crises, stats, _) = setup();
    stats.set_stat("trust", 20.0);
    let (crisis, _) = crises.tick(t0(), &stats, &mut quiet()).opened.expect("trust crisis");
    assert_eq!(crisis.name, "trust_crisis");
    assert_eq!(crisis.severity, MIN_SEVERITY);
    assert!((crisis.stat_penalties["happiness"] + 0.3 * MIN_SEVERITY).abs() < 1e-12);
}

#[test]
fn one_crisis_per_check_and_cap_respected() {
    let (crises, stats, _) = setup();
    stats.set_stat("jealousy", 90.0);
    stats.set_stat("trust", 5.0);
    stats.set_stat("affection", 5.0);

    assert!(crises.tick(t0(), &stats, &mut quiet()).opened.is_some());
    assert_eq!(crises.get_active_crises().len(), 1);

    // Not due yet.
    assert!(crises.tick(t0() + Duration::seconds(30), &stats, &mut quiet()).opened.is_none());

    let (second, _) = crises
        .tick(t0() + Duration::seconds(60), &stats, &mut quiet())
        .opened
        .expect("trust crisis on the next check");
    assert_eq!(second.name, "trust_crisis");

    assert!(
        crises.tick(t0() + Duration::seconds(120), &stats, &mut quiet()).opened.is_none(),
        "max two active crises"
    );
    let names: Vec<_> = crises.get_active_crises().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["jealousy_crisis", "trust_crisis"]);
}

#[test]
fn ongoing_event_uses_active_crisis() {
    let (crises, stats, _) = setup();
    stats.set_stat("jealousy", 90.0);
    let mut always = SequenceRng::constant(0.0);

    let first = crises.tick(t0(), &stats, &mut always);
    assert!(first.opened.is_some());
    assert!(first.ongoing.is_none(), "no ongoing event on the opening tick");

    let next = crises.tick(t0() + Duration::seconds(10), &stats, &mut always);
    let ongoing = next.ongoing.expect("ongoing event rolled");
    assert_eq!(ongoing.name, "jealousy_crisis_ongoing");
    assert!(ongoing.effects.is_empty());
}

/// Crisis opened at t0 with a 30 minute time requirement.
#[test]
fn recovery_waits_for_time_requirement() {
    let (crises, stats, history) = setup();
    stats.set_stat("jealousy", 90.0);
    crises.tick(t0(), &stats, &mut quiet());

    for kind in ["apology", "apology", "deep_conversation", "give_gift"] {
        history.record(kind, t0() + Duration::minutes(1));
    }
    stats.set_stat("jealousy", 50.0);

    assert!(
        crises
            .check_recovery(t0() + Duration::minutes(10), &stats, &history, "apology")
            .is_none(),
        "too early to recover"
    );
    assert!(crises.has_crisis("jealousy_crisis"));

    let trust_before = stats.get_stat("trust");
    let recovery = crises
        .check_recovery(t0() + Duration::minutes(31), &stats, &history, "apology")
        .expect("recovers after 31 minutes");
    assert_eq!(recovery.crisis.name, "jealousy_crisis");
    assert!(!recovery.crisis.is_active);
    assert_eq!(recovery.event.name, "jealousy_crisis_recovered");
    assert!(crises.get_active_crises().is_empty());
    assert!((stats.get_stat("trust") - trust_before - 12.0).abs() < 1e-9, "bonus x1.2");
}

#[test]
fn recovery_needs_every_requirement() {
    let (crises, stats, history) = setup();
    stats.set_stat("jealousy", 90.0);
    crises.tick(t0(), &stats, &mut quiet());
    let later = t0() + Duration::hours(1);

    // Interactions before the crisis do not count.
    for kind in ["apology", "apology", "deep_conversation", "give_gift"] {
        history.record(kind, t0() - Duration::minutes(5));
    }
    stats.set_stat("jealousy", 50.0);
    assert!(crises.check_recovery(later, &stats, &history, "apology").is_none());

    for kind in ["apology", "apology", "deep_conversation", "give_gift"] {
        history.record(kind, t0() + Duration::minutes(5));
    }
    stats.set_stat("jealousy", 65.0);
    assert!(
        crises.check_recovery(later, &stats, &history, "apology").is_none(),
        "jealousy must be back under 60"
    );

    stats.set_stat("jealousy", 60.0);
    assert!(crises.check_recovery(later, &stats, &history, "apology").is_some());
}

#[test]
fn resolved_crisis_can_reopen() {
    let (crises, stats, history) = setup();
    stats.set_stat("jealousy", 90.0);
    crises.tick(t0(), &stats, &mut quiet());
    for kind in ["apology", "apology", "deep_conversation", "give_gift"] {
        history.record(kind, t0());
    }
    stats.set_stat("jealousy", 10.0);
    assert!(crises.check_recovery(t0() + Duration::hours(1), &stats, &history, "pet").is_some());

    stats.set_stat("jealousy", 95.0);
    let (again, _) = crises
        .tick(t0() + Duration::hours(2), &stats, &mut quiet())
        .opened
        .expect("fresh instance");
    assert_eq!(again.triggered_at, t0() + Duration::hours(2));
}

#[test]
fn recovery_bonus_never_below_one() {
    let (crises, _, _) = setup();
    assert_eq!(crises.recovery_bonus(), 1.2);
    crises.set_recovery_bonus(0.5);
    assert_eq!(crises.recovery_bonus(), 1.0);
    crises.set_recovery_bonus(2.0);
    assert_eq!(crises.recovery_bonus(), 2.0);
}

#[test]
fn disabled_manager_does_nothing() {
    let crises = CrisisManager::new(CrisisConfig::disabled());
    let stats = StatStore::from_config(&CompanionConfig::default_test().stats);
    stats.set_stat("jealousy", 100.0);
    let out = crises.tick(t0(), &stats, &mut quiet());
    assert!(out.opened.is_none() && out.ongoing.is_none());
    assert_eq!(crises.get_crisis_status(t0())["enabled"], false);
}

#[test]
fn status_lists_active_details() {
    let (crises, stats, _) = setup();
    stats.set_stat("affection", 5.0);
    crises.tick(t0(), &stats, &mut quiet());
    let status = crises.get_crisis_status(t0() + Duration::minutes(2));
    assert_eq!(status["activeCrises"], 1);
    assert_eq!(status["maxCrises"], 2);
    assert_eq!(status["crisisDetails"][0]["name"], "affection_crisis");
    assert_eq!(status["crisisDetails"][0]["durationSecs"], 120);
}

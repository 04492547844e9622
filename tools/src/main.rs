//! companion-runner: headless driver for companion-core.
//!
//! Usage:
//!   companion-runner --seed 12345 --ticks 600 --tick-secs 10 --db save.db
//!   companion-runner --data-dir ./data --interact-every 12
//!   companion-runner --seed 7 --ipc-mode

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use companion_core::{
    config::CompanionConfig,
    engine::CompanionEngine,
    event::CompanionEvent,
    stats::StatReader,
    store::CompanionStore,
    types::Tick,
};
use std::collections::BTreeMap;
use std::env;
use std::io::{self, BufRead, Write};
use std::path::Path;
use log::warn;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    GetState,
    Tick { count: u64 },
    Interact { interaction_type: String },
    Quit,
}

#[derive(serde::Serialize)]
struct UiState {
    tick:           Tick,
    paused:         bool,
    now:            String,
    stats:          BTreeMap<String, f64>,
    mood:           String,
    level:          Option<String>,
    /// Level override for the idle animation, if the level has one.
    idle_animation: Option<String>,
    achievements:   Vec<String>,
    active_crises:  Vec<String>,
    events:         Vec<CompanionEvent>,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let ticks = parse_arg(&args, "--ticks", 600u64);
    let tick_secs = parse_arg(&args, "--tick-secs", 10i64);
    let interact_every = parse_arg(&args, "--interact-every", 30u64);
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = string_arg(&args, "--data-dir").unwrap_or("./data");
    let companion_id = string_arg(&args, "--companion-id")
        .map(str::to_string)
        .unwrap_or_else(|| format!("companion-{}", uuid::Uuid::new_v4()));
    let start: DateTime<Utc> = match string_arg(&args, "--start") {
        Some(s) => DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("Invalid --start '{s}'"))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    if !ipc_mode {
        println!("companion-runner");
        println!("  companion:      {companion_id}");
        println!("  seed:           {seed}");
        println!("  ticks:          {ticks} x {tick_secs}s");
        println!("  interact every: {interact_every} ticks");
        println!("  db:             {db}");
        println!("  data_dir:       {data_dir}");
        println!();
    }

    let config = if Path::new(data_dir).join("stats.json").exists() {
        CompanionConfig::load(data_dir)?
    } else {
        warn!("no stats.json under {data_dir}, using built-in defaults");
        CompanionConfig::default_test()
    };
    let interaction_types: Vec<String> = config.interactions.keys().cloned().collect();

    let mut engine = CompanionEngine::build(companion_id, seed, config, start)?;
    engine.attach_store(CompanionStore::open(db)?)?;

    let step = Duration::seconds(tick_secs.max(1));
    if ipc_mode {
        run_ipc_loop(&mut engine, step)?;
        return Ok(());
    }

    let mut interactions = 0usize;
    let mut rejected = 0usize;
    for i in 0..ticks {
        engine.tick(step)?;
        if interact_every > 0 && !interaction_types.is_empty() && (i + 1) % interact_every == 0 {
            // Round-robin scripted player.
            let kind = &interaction_types[interactions % interaction_types.len()];
            let events = engine.perform_interaction(kind)?;
            if events
                .iter()
                .any(|e| matches!(e, CompanionEvent::InteractionRejected { .. }))
            {
                rejected += 1;
            }
            interactions += 1;
        }
    }
    engine.save_snapshot()?;

    print_summary(&engine, interactions, rejected)?;
    Ok(())
}

fn run_ipc_loop(engine: &mut CompanionEngine, step: Duration) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        let events = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::GetState => Vec::new(),
            IpcCommand::Tick { count } => {
                let mut events = Vec::new();
                for _ in 0..count {
                    events.extend(
                        engine
                            .tick(step)?
                            .into_iter()
                            .filter(|e| e.triggered().is_some()),
                    );
                }
                events
            }
            IpcCommand::Interact { interaction_type } => engine.perform_interaction(&interaction_type)?,
        };
        let state = build_ui_state(engine, events);
        writeln!(stdout, "{}", serde_json::to_string(&state)?)?;
        stdout.flush()?;
    }
    engine.save_snapshot()?;
    Ok(())
}

fn build_ui_state(engine: &CompanionEngine, events: Vec<CompanionEvent>) -> UiState {
    let stats = engine.stats();
    let progression = engine.progression();
    UiState {
        tick:           engine.clock.current_tick,
        paused:         engine.clock.paused,
        now:            engine.clock.now.to_rfc3339(),
        stats:          stats.get_stats(),
        mood:           stats.mood_category().to_string(),
        level:          progression.as_ref().and_then(|p| p.current_level()).map(|l| l.name),
        idle_animation: progression.as_ref().and_then(|p| p.level_animation("idle")),
        achievements:   progression.map(|p| p.get_achievements()).unwrap_or_default(),
        active_crises:  engine
            .crisis()
            .map(|c| c.get_active_crises().into_iter().map(|c| c.name).collect())
            .unwrap_or_default(),
        events,
    }
}

fn print_summary(engine: &CompanionEngine, interactions: usize, rejected: usize) -> Result<()> {
    let stats = engine.stats();

    println!("=== RUN SUMMARY ===");
    println!("  companion:      {}", engine.companion_id);
    println!("  final tick:     {}", engine.clock.current_tick);
    println!("  simulated time: {} min", engine.clock.total_play_time.num_minutes());
    println!("  interactions:   {interactions} ({rejected} rejected)");
    println!("  mood:           {} ({:.1})", stats.mood_category(), stats.overall_mood());

    println!();
    println!("=== STATS ===");
    for (name, value) in stats.get_stats() {
        println!("  {name:<12} {value:>6.1} / {:.0}", stats.stat_max(&name));
    }

    if let Some(progression) = engine.progression() {
        println!();
        println!("=== PROGRESSION ===");
        if let Some(level) = progression.current_level() {
            println!("  level:          {} (size {})", level.name, level.size);
        }
        println!("  age:            {} min", progression.get_age().num_minutes());
        let achievements = progression.get_achievements();
        if achievements.is_empty() {
            println!("  achievements:   (none yet)");
        } else {
            println!("  achievements:   {}", achievements.join(", "));
        }
    }

    if let Some(crisis) = engine.crisis() {
        let active = crisis.get_active_crises();
        println!();
        println!("=== CRISES ===");
        if active.is_empty() {
            println!("  (none active)");
        }
        for c in active {
            println!("  {:<18} severity {:.2}  cause {}", c.name, c.severity, c.trigger_cause);
        }
    }

    if let Some(store) = engine.store() {
        println!();
        println!("=== EVENT LOG ===");
        for (event_type, count) in store.event_counts(&engine.companion_id)? {
            println!("  {event_type:<22} {count}");
        }
    }
    Ok(())
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str, default: T) -> T {
    string_arg(args, flag)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

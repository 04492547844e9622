//! companion-core: the stat-simulation core of a virtual companion.
//!
//! One `CompanionEngine` per companion. Each engine owns a stat store,
//! an interaction history and a fixed list of periodic subsystems.
//! See engine.rs for the execution order.

pub mod clock;
pub mod compatibility;
pub mod config;
pub mod crisis;
pub mod decay_subsystem;
pub mod engine;
pub mod error;
pub mod event;
pub mod history;
pub mod jealousy;
pub mod progression;
pub mod random_events;
pub mod rng;
pub mod snapshot;
pub mod stats;
pub mod store;
pub mod subsystem;
pub mod trigger;
pub mod types;

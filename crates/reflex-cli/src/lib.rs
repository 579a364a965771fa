//! # reflex-cli
//!
//! Command-line interface for inspecting and driving the Reflex knowledge store.
//!
//! ## Commands
//!
//! - `reflex stats`: store and skill counters
//! - `reflex skills`: list learned skills
//! - `reflex skill <id>`: show one skill with its replay history
//! - `reflex trajectory <id>`: show one trajectory with its actions
//! - `reflex trajectories`: recent trajectories
//! - `reflex route <task> <url>`: dry-run the fast/normal decision
//! - `reflex learn <file>`: persist a recorded trajectory and synthesize from it
//! - `reflex outcome <skill-id>`: report a replay outcome
//! - `reflex config`: show the effective configuration

pub mod commands;

pub use commands::Cli;

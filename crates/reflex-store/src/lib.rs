//! # reflex-store
//!
//! The single source of truth for what has been learned: an append-only log
//! of trajectories, versioned skills with their reliability, and the
//! similarity search over both.

pub mod confidence;
pub mod similarity;
pub mod stats;
pub mod store;

pub use confidence::ConfidenceModel;
pub use stats::{SkillStats, StoreStats};
pub use store::{ConfidenceUpdate, KnowledgeStore, NewSkill, SkillMatch, SkillOutcome, TrajectoryMatch};

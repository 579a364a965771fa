//! # reflex-core
//!
//! Core types, traits, and primitives for the Reflex skill-acceleration engine.
//! This crate defines the shared vocabulary used by every other crate in the workspace:
//! recorded trajectories, persisted skills, the action-script language skills are
//! compiled into, and the narrow `Page` capability scripts run against.

pub mod error;
pub mod event;
pub mod page;
pub mod script;
pub mod skill;
pub mod trajectory;
pub mod types;

pub use error::{ReflexError, Result};
pub use event::{Event, EventBus};
pub use page::{Page, PageCall, RecordingPage};
pub use script::{ScriptStep, SkillScript, Template};
pub use skill::{ParamType, Skill, SkillParameter};
pub use trajectory::{ActionType, RecordedAction, RecordedTrajectory, Trajectory, TrajectoryRecorder};
pub use types::*;

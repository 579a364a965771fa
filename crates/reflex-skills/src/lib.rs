//! # reflex-skills
//!
//! The three stages of the skill life cycle that sit between the store and
//! the page: synthesizing a verified skill from a trajectory, binding a
//! skill's parameters from a new task, and replaying the skill safely.

pub mod classify;
pub mod executor;
pub mod extractor;
pub mod generator;
pub mod synthesizer;
pub mod verifier;

pub use classify::{Classification, TaskValue, classify};
pub use executor::{ExecutionError, ExecutionErrorKind, ExecutionResult, SkillExecutor};
pub use extractor::{ExtractionMethod, ExtractionResult, ParameterExtractor};
pub use generator::{GenerationRequest, LlmGenerator, ScriptGenerator, TemplateGenerator};
pub use synthesizer::{SkillSynthesizer, SynthesisOutcome, SynthesisResult};
pub use verifier::{Verifier, Violation};

//! # reflex-config
//!
//! Configuration system for Reflex. Reads from `reflex.toml` and environment
//! variables, with CLI overrides applied by the caller, in that precedence order.

pub mod schema;
pub mod loader;

pub use schema::ReflexConfig;
pub use schema::{
    ConfidenceConfig, ConfigWarning, ExecutorConfig, ExtractionConfig, LlmConfig, LoggingConfig,
    MatchingConfig, RouterConfig, StoreConfig, SynthesisConfig, WarningSeverity,
};
pub use loader::ConfigLoader;

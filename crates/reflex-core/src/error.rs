use thiserror::Error;

/// Unified error type for the Reflex engine.
#[derive(Error, Debug)]
pub enum ReflexError {
    // ── Storage errors ─────────────────────────────────────────
    #[error("storage error: {0}")]
    Storage(String),

    #[error("skill not found: {0}")]
    SkillNotFound(String),

    #[error("trajectory not found: {0}")]
    TrajectoryNotFound(String),

    // ── LLM errors ─────────────────────────────────────────────
    #[error("llm provider error: {0}")]
    Llm(String),

    #[error("llm request timed out after {secs}s")]
    LlmTimeout { secs: u64 },

    // ── Acceleration-path errors ───────────────────────────────
    #[error("skill synthesis failed after {attempts} attempt(s): {reason}")]
    Synthesis { attempts: u32, reason: String },

    #[error("parameter extraction failed: {0}")]
    Extraction(String),

    #[error("skill script error: {0}")]
    Script(String),

    #[error("skill execution timed out after {timeout_ms}ms")]
    ExecutionTimeout { timeout_ms: u64 },

    #[error("skill execution failed: {0}")]
    Execution(String),

    #[error("page operation failed: {op}: {reason}")]
    Page { op: String, reason: String },

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ReflexError {
    /// Whether the error means the learning substrate itself is broken.
    ///
    /// Everything else belongs to the optional acceleration path and is
    /// recovered by falling back to the normal agent path.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReflexError::Storage(_) | ReflexError::Io(_))
    }

    pub fn page(op: &str, reason: impl Into<String>) -> Self {
        ReflexError::Page {
            op: op.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReflexError>;

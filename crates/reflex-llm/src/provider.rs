use async_trait::async_trait;
use reflex_core::Result;
use serde::{Deserialize, Serialize};

/// A single-turn request to a completion service.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    /// System prompt.
    pub system: Option<String>,
    /// The user prompt.
    pub prompt: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    pub temperature: f32,
}

impl LlmRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            prompt: prompt.into(),
            max_tokens: 1024,
            temperature: 0.2,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// A complete response from a completion service.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub usage: Usage,
    pub stop_reason: StopReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ContentFilter,
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Trait implemented by each completion backend.
///
/// Synthesis and extraction treat every error from a provider as recoverable.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable name, e.g. "openai".
    fn name(&self) -> &str;

    /// Send a non-streaming request.
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse>;

    /// Check if this provider is reachable.
    async fn health_check(&self) -> Result<()>;
}

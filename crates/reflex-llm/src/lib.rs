//! # reflex-llm
//!
//! Abstraction over the completion service used to draft skill scripts and to
//! extract parameters when pattern matching is inconclusive. The learning loop
//! works without one; every call site treats provider errors as recoverable.

pub mod mock;
pub mod openai;
pub mod parse;
pub mod provider;

use std::sync::Arc;

pub use mock::MockProvider;
pub use openai::OpenAiProvider;
pub use parse::{extract_json, parse_json};
pub use provider::{LlmProvider, LlmRequest, LlmResponse, StopReason, Usage};

/// Build the configured provider, or `None` when no API key is available.
pub fn provider_from_config(config: &reflex_config::LlmConfig) -> Option<Arc<dyn LlmProvider>> {
    if !config.is_configured() {
        tracing::debug!("no completion service configured");
        return None;
    }
    let api_key = config.api_key.clone()?;
    let provider = OpenAiProvider::new(api_key)
        .with_base_url(config.base_url.clone(), config.provider.clone())
        .with_timeout(config.timeout_secs);
    Some(Arc::new(provider))
}

/// Build a request carrying the configured model and sampling settings.
pub fn request_from_config(config: &reflex_config::LlmConfig, system: &str, prompt: String) -> LlmRequest {
    LlmRequest {
        model: config.model.clone(),
        system: Some(system.to_string()),
        prompt,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    }
}

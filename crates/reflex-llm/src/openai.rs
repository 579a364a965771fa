use async_trait::async_trait;
use reflex_core::{ReflexError, Result};
use std::time::Duration;
use tracing::debug;

use crate::provider::*;

/// OpenAI-compatible chat-completions provider (OpenAI, Azure, vLLM, etc.)
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
    timeout_secs: u64,
}

impl OpenAiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://api.openai.com/v1".into(),
            provider_name: "openai".into(),
            timeout_secs: 30,
        }
    }

    /// Use a custom base URL (for Azure, Together, vLLM, etc.)
    pub fn with_base_url(mut self, url: String, name: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self.provider_name = name;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn map_send_error(&self, e: reqwest::Error) -> ReflexError {
        if e.is_timeout() {
            ReflexError::LlmTimeout {
                secs: self.timeout_secs,
            }
        } else {
            ReflexError::Llm(e.to_string())
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let mut messages = Vec::new();
        if let Some(ref system) = request.system {
            messages.push(serde_json::json!({
                "role": "system",
                "content": system,
            }));
        }
        messages.push(serde_json::json!({
            "role": "user",
            "content": request.prompt,
        }));

        let mut body = serde_json::json!({
            "model": &request.model,
            "temperature": request.temperature,
            "messages": messages,
        });

        // Newer OpenAI models (o1, o3, gpt-5, …) require max_completion_tokens
        if uses_max_completion_tokens(&request.model) {
            body["max_completion_tokens"] = serde_json::json!(request.max_tokens);
        } else {
            body["max_tokens"] = serde_json::json!(request.max_tokens);
        }

        debug!(model = %request.model, provider = %self.provider_name, "sending completion request");

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(ReflexError::Llm(format!("HTTP {status}: {text}")));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| self.map_send_error(e))?;

        parse_chat_completion(&data)
    }

    async fn health_check(&self) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(Duration::from_secs(self.timeout_secs))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ReflexError::Llm(format!("HTTP {}", resp.status())))
        }
    }
}

/// Parse a chat-completions response body.
pub(crate) fn parse_chat_completion(data: &serde_json::Value) -> Result<LlmResponse> {
    let choice = data["choices"]
        .get(0)
        .ok_or_else(|| ReflexError::Llm("response has no choices".into()))?;
    let text = choice["message"]["content"]
        .as_str()
        .unwrap_or("")
        .to_string();

    let usage_data = &data["usage"];
    let usage = Usage {
        input_tokens: usage_data["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        output_tokens: usage_data["completion_tokens"].as_u64().unwrap_or(0) as u32,
    };

    let stop_reason = match choice["finish_reason"].as_str().unwrap_or("") {
        "length" => StopReason::MaxTokens,
        "content_filter" => StopReason::ContentFilter,
        _ => StopReason::EndTurn,
    };

    Ok(LlmResponse {
        text,
        usage,
        stop_reason,
    })
}

fn uses_max_completion_tokens(model: &str) -> bool {
    let m = model.to_lowercase();
    m.starts_with("o1") || m.starts_with("o3") || m.starts_with("o4") || m.starts_with("gpt-5")
}

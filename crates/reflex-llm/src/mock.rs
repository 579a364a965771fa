//! Mock completion provider for deterministic testing.
//!
//! Returns pre-configured responses without making any HTTP calls.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use crate::provider::*;
use reflex_core::{ReflexError, Result};

/// A mock provider that returns queued responses in order.
///
/// # Example
/// ```
/// use reflex_llm::mock::MockProvider;
/// let provider = MockProvider::new("test")
///     .with_response(r#"{"query": "rust"}"#);
/// ```
pub struct MockProvider {
    responses: Arc<Mutex<Vec<MockResponse>>>,
    /// Track all requests received (for assertions in tests).
    pub requests: Arc<Mutex<Vec<LlmRequest>>>,
    name: String,
}

/// A pre-configured response from the mock provider.
#[derive(Clone, Default)]
pub struct MockResponse {
    pub text: String,
    pub usage: Usage,
    /// If set, the provider will return this error instead.
    pub error: Option<String>,
    /// Sleep before answering.
    pub delay: Option<Duration>,
}

impl MockResponse {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn error(msg: &str) -> Self {
        Self {
            error: Some(msg.to_string()),
            ..Default::default()
        }
    }
}

impl MockProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(vec![])),
            requests: Arc::new(Mutex::new(vec![])),
            name: name.into(),
        }
    }

    /// Queue a simple text response.
    pub fn with_response(self, text: &str) -> Self {
        self.responses.lock().push(MockResponse::text(text));
        self
    }

    /// Queue an error response.
    pub fn with_error(self, error: &str) -> Self {
        self.responses.lock().push(MockResponse::error(error));
        self
    }

    /// Queue a fully custom response.
    pub fn with_mock_response(self, resp: MockResponse) -> Self {
        self.responses.lock().push(resp);
        self
    }

    /// Get all requests that were made to this provider.
    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Pop the next queued response; an exhausted queue answers with an error.
    fn next_response(&self) -> MockResponse {
        let mut responses = self.responses.lock();
        if responses.is_empty() {
            MockResponse::error("mock: no more queued responses")
        } else {
            responses.remove(0)
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        self.requests.lock().push(request.clone());
        let mock = self.next_response();

        if let Some(delay) = mock.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = mock.error {
            return Err(ReflexError::Llm(error));
        }

        Ok(LlmResponse {
            text: mock.text,
            usage: mock.usage,
            stop_reason: StopReason::EndTurn,
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_text_response() {
        let provider = MockProvider::new("mock").with_response("Hello!");
        let resp = provider.complete(&LlmRequest::new("test", "hi")).await.unwrap();
        assert_eq!(resp.text, "Hello!");
        assert_eq!(resp.stop_reason, StopReason::EndTurn);
    }

    #[tokio::test]
    async fn test_mock_error() {
        let provider = MockProvider::new("mock").with_error("HTTP 429: rate limited");
        let result = provider.complete(&LlmRequest::new("test", "hi")).await;
        assert!(matches!(result, Err(ReflexError::Llm(_))));
    }

    #[tokio::test]
    async fn test_mock_records_requests() {
        let provider = MockProvider::new("mock").with_response("ok");
        let req = LlmRequest::new("test", "hello").with_system("be terse");
        let _ = provider.complete(&req).await;
        let recorded = provider.recorded_requests();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].system.as_deref(), Some("be terse"));
        assert_eq!(recorded[0].prompt, "hello");
    }

    #[tokio::test]
    async fn test_mock_multiple_responses_in_order() {
        let provider = MockProvider::new("mock")
            .with_response("first")
            .with_response("second");
        let req = LlmRequest::new("test", "x");
        assert_eq!(provider.complete(&req).await.unwrap().text, "first");
        assert_eq!(provider.complete(&req).await.unwrap().text, "second");
        assert!(provider.complete(&req).await.is_err());
    }
}

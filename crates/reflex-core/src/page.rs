//! The narrow page capability skills execute against.
//!
//! The engine depends only on this trait, never on a concrete browser binding.
//! [`RecordingPage`] is an in-memory implementation for tests and dry runs.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ReflexError, Result};

/// Asynchronous page operations. Callers bound every call with a timeout.
#[async_trait]
pub trait Page: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn click(&self, selector: &str) -> Result<()>;

    async fn fill(&self, selector: &str, value: &str) -> Result<()>;

    async fn evaluate(&self, expr: &str) -> Result<Value>;

    async fn wait_for_selector(&self, selector: &str) -> Result<()>;

    /// PNG bytes of the current viewport.
    async fn screenshot(&self) -> Result<Vec<u8>>;
}

/// A page call observed by [`RecordingPage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PageCall {
    Navigate { url: String },
    Click { selector: String },
    Fill { selector: String, value: String },
    Evaluate { expr: String },
    WaitForSelector { selector: String },
    Screenshot,
}

#[derive(Default)]
struct Behaviour {
    failing_selectors: HashSet<String>,
    panicking_selectors: HashSet<String>,
    evaluations: HashMap<String, Value>,
    delay: Option<Duration>,
}

/// Records every call and optionally misbehaves on demand.
///
/// # Example
/// ```
/// use reflex_core::page::RecordingPage;
/// let page = RecordingPage::new()
///     .with_evaluation("document.title", serde_json::json!("Hacker News"))
///     .failing_on("#broken");
/// ```
#[derive(Clone, Default)]
pub struct RecordingPage {
    calls: Arc<Mutex<Vec<PageCall>>>,
    behaviour: Arc<Mutex<Behaviour>>,
}

impl RecordingPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return an error for any click/fill/wait on this selector.
    pub fn failing_on(self, selector: &str) -> Self {
        self.behaviour.lock().failing_selectors.insert(selector.to_string());
        self
    }

    /// Panic on any click/fill/wait on this selector.
    pub fn panicking_on(self, selector: &str) -> Self {
        self.behaviour.lock().panicking_selectors.insert(selector.to_string());
        self
    }

    /// Sleep before every operation.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.behaviour.lock().delay = Some(delay);
        self
    }

    /// Value returned when `expr` is evaluated (default `null`).
    pub fn with_evaluation(self, expr: &str, value: Value) -> Self {
        self.behaviour.lock().evaluations.insert(expr.to_string(), value);
        self
    }

    /// All calls observed so far, in order.
    pub fn calls(&self) -> Vec<PageCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    async fn enter(&self, op: &str, selector: Option<&str>, call: PageCall) -> Result<()> {
        let (delay, fails, panics) = {
            let b = self.behaviour.lock();
            let fails = selector.is_some_and(|s| b.failing_selectors.contains(s));
            let panics = selector.is_some_and(|s| b.panicking_selectors.contains(s));
            (b.delay, fails, panics)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().push(call);
        if panics {
            panic!("page panicked during {op}");
        }
        if fails {
            return Err(ReflexError::page(
                op,
                format!("no element matches selector '{}'", selector.unwrap_or_default()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Page for RecordingPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.enter("navigate", None, PageCall::Navigate { url: url.to_string() })
            .await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let call = PageCall::Click {
            selector: selector.to_string(),
        };
        self.enter("click", Some(selector), call).await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let call = PageCall::Fill {
            selector: selector.to_string(),
            value: value.to_string(),
        };
        self.enter("fill", Some(selector), call).await
    }

    async fn evaluate(&self, expr: &str) -> Result<Value> {
        let call = PageCall::Evaluate {
            expr: expr.to_string(),
        };
        self.enter("evaluate", None, call).await?;
        Ok(self
            .behaviour
            .lock()
            .evaluations
            .get(expr)
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn wait_for_selector(&self, selector: &str) -> Result<()> {
        let call = PageCall::WaitForSelector {
            selector: selector.to_string(),
        };
        self.enter("wait_for_selector", Some(selector), call).await
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.enter("screenshot", None, PageCall::Screenshot).await?;
        // PNG signature only; enough for callers that check the header.
        Ok(vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn records_calls_in_order() {
        let page = RecordingPage::new().with_evaluation("1+1", json!(2));
        page.navigate("https://a.com").await.unwrap();
        page.fill("#q", "rust").await.unwrap();
        page.click("#go").await.unwrap();
        assert_eq!(page.evaluate("1+1").await.unwrap(), json!(2));
        assert_eq!(page.evaluate("unknown").await.unwrap(), Value::Null);

        let calls = page.calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(calls[1], PageCall::Fill { selector: "#q".into(), value: "rust".into() });
        assert_eq!(calls[2], PageCall::Click { selector: "#go".into() });
    }

    #[tokio::test]
    async fn failing_selector_errors() {
        let page = RecordingPage::new().failing_on("#gone");
        let err = page.click("#gone").await.unwrap_err();
        assert!(matches!(err, ReflexError::Page { .. }));
        assert!(page.click("#here").await.is_ok());
    }

    #[tokio::test]
    async fn clones_share_the_log() {
        let page = RecordingPage::new();
        let handle = page.clone();
        page.navigate("https://a.com").await.unwrap();
        assert_eq!(handle.call_count(), 1);
        handle.clear();
        assert_eq!(page.call_count(), 0);
    }
}

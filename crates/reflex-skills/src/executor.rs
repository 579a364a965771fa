//! Interpreting a skill script against a live page.
//!
//! Each run gets a fresh scope holding only the bound parameters and the
//! locals the script itself stores, so runs never see each other's state.
//! Nothing escapes `execute`: structural problems, page errors, panics and
//! timeouts all come back as an unsuccessful [`ExecutionResult`].

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use reflex_config::ExecutorConfig;
use reflex_core::{Page, ReflexError, Result, ScriptStep, Skill, SkillScript};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    /// The code could not be run at all; the page was not touched.
    Structural,
    Timeout,
    /// A step failed or panicked part-way through.
    Runtime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub message: String,
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    /// Value of the last `evaluate` step, or `null`.
    pub result: Value,
    pub error: Option<ExecutionError>,
    pub duration_ms: u64,
    pub steps_completed: usize,
}

impl ExecutionResult {
    fn failed(kind: ExecutionErrorKind, message: impl Into<String>, started: Instant, steps_completed: usize) -> Self {
        Self {
            success: false,
            result: Value::Null,
            error: Some(ExecutionError {
                kind,
                message: message.into(),
            }),
            duration_ms: elapsed_ms(started),
            steps_completed,
        }
    }

    pub fn timed_out(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.kind == ExecutionErrorKind::Timeout)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}

#[derive(Debug, Clone)]
pub struct SkillExecutor {
    default_timeout: Duration,
}

impl Default for SkillExecutor {
    fn default() -> Self {
        Self::from_config(&ExecutorConfig::default())
    }
}

impl SkillExecutor {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(Duration::from_millis(config.default_timeout_ms))
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub async fn execute_skill(
        &self,
        page: &dyn Page,
        skill: &Skill,
        params: &Map<String, Value>,
        timeout: Option<Duration>,
    ) -> ExecutionResult {
        self.execute(page, &skill.code, &skill.name, params, timeout).await
    }

    /// Run `function_name` from `code` with `params` bound.
    pub async fn execute(
        &self,
        page: &dyn Page,
        code: &str,
        function_name: &str,
        params: &Map<String, Value>,
        timeout: Option<Duration>,
    ) -> ExecutionResult {
        let started = Instant::now();
        let (script, scope) = match prepare(code, function_name, params) {
            Ok(prepared) => prepared,
            Err(message) => {
                debug!(function = function_name, error = %message, "skill rejected before execution");
                return ExecutionResult::failed(ExecutionErrorKind::Structural, message, started, 0);
            }
        };

        let budget = timeout.unwrap_or(self.default_timeout);
        let completed = AtomicUsize::new(0);
        let run = AssertUnwindSafe(run_steps(page, &script, scope, &completed)).catch_unwind();
        let outcome = tokio::time::timeout(budget, run).await;
        let steps_completed = completed.load(Ordering::SeqCst);

        match outcome {
            Ok(Ok(Ok(result))) => ExecutionResult {
                success: true,
                result,
                error: None,
                duration_ms: elapsed_ms(started),
                steps_completed,
            },
            Ok(Ok(Err(e))) => ExecutionResult::failed(ExecutionErrorKind::Runtime, e.to_string(), started, steps_completed),
            Ok(Err(panic)) => {
                let message = panic_message(panic.as_ref());
                warn!(function = function_name, panic = %message, "skill panicked");
                ExecutionResult::failed(
                    ExecutionErrorKind::Runtime,
                    format!("skill panicked: {message}"),
                    started,
                    steps_completed,
                )
            }
            Err(_) => ExecutionResult::failed(
                ExecutionErrorKind::Timeout,
                ReflexError::ExecutionTimeout {
                    timeout_ms: budget.as_millis().try_into().unwrap_or(u64::MAX),
                }
                .to_string(),
                started,
                steps_completed,
            ),
        }
    }
}

/// Parse the code, check the function name, and bind typed parameters.
fn prepare(
    code: &str,
    function_name: &str,
    params: &Map<String, Value>,
) -> std::result::Result<(SkillScript, HashMap<String, Value>), String> {
    let script = SkillScript::parse(code).map_err(|e| e.to_string())?;
    if script.function != function_name {
        return Err(format!(
            "function '{function_name}' is not defined (code defines '{}')",
            script.function
        ));
    }
    let mut scope = HashMap::with_capacity(script.parameters.len());
    for p in &script.parameters {
        let raw = params
            .get(&p.name)
            .ok_or_else(|| format!("missing argument '{}'", p.name))?;
        let value = p
            .param_type
            .coerce(raw)
            .ok_or_else(|| format!("argument '{}' is not a valid {}", p.name, p.param_type))?;
        scope.insert(p.name.clone(), value);
    }
    Ok((script, scope))
}

async fn run_steps(
    page: &dyn Page,
    script: &SkillScript,
    mut scope: HashMap<String, Value>,
    completed: &AtomicUsize,
) -> Result<Value> {
    let mut last = Value::Null;
    for (i, step) in script.steps.iter().enumerate() {
        run_step(page, step, &mut scope, &mut last)
            .await
            .map_err(|e| ReflexError::Execution(format!("step {} ({}): {e}", i + 1, step.op_name())))?;
        completed.fetch_add(1, Ordering::SeqCst);
    }
    Ok(last)
}

async fn run_step(
    page: &dyn Page,
    step: &ScriptStep,
    scope: &mut HashMap<String, Value>,
    last: &mut Value,
) -> Result<()> {
    match step {
        ScriptStep::Navigate { url } => page.navigate(&url.render(scope, true)?).await,
        ScriptStep::Click { selector } => page.click(&selector.render(scope, false)?).await,
        ScriptStep::Fill { selector, value } => {
            let selector = selector.render(scope, false)?;
            let value = value.render(scope, false)?;
            page.fill(&selector, &value).await
        }
        ScriptStep::Evaluate { expr, store_as } => {
            let value = page.evaluate(&expr.render_json(scope)?).await?;
            if let Some(name) = store_as {
                scope.insert(name.clone(), value.clone());
            }
            *last = value;
            Ok(())
        }
        ScriptStep::WaitFor { selector } => page.wait_for_selector(&selector.render(scope, false)?).await,
        ScriptStep::Screenshot => page.screenshot().await.map(|_| ()),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflex_core::{PageCall, RecordingPage};
    use serde_json::json;

    const SEARCH: &str = r#"{
        "function": "search_hn",
        "parameters": [{"name": "query", "type": "string"}],
        "steps": [
            {"op": "navigate", "url": "https://news.ycombinator.com"},
            {"op": "fill", "selector": "input[name=q]", "value": "{{query}}"},
            {"op": "click", "selector": "input[type=submit]"}
        ]
    }"#;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn runs_steps_in_order() {
        let page = RecordingPage::new();
        let exec = SkillExecutor::default();
        let res = exec
            .execute(&page, SEARCH, "search_hn", &args(json!({"query": "rust"})), None)
            .await;
        assert!(res.success, "{:?}", res.error);
        assert_eq!(res.steps_completed, 3);
        assert_eq!(res.result, Value::Null);
        assert_eq!(
            page.calls()[1],
            PageCall::Fill {
                selector: "input[name=q]".into(),
                value: "rust".into()
            }
        );
    }

    #[tokio::test]
    async fn wrong_function_name_never_touches_the_page() {
        let page = RecordingPage::new();
        let res = SkillExecutor::default()
            .execute(&page, SEARCH, "search_github", &args(json!({"query": "rust"})), None)
            .await;
        assert!(!res.success);
        let err = res.error.unwrap();
        assert_eq!(err.kind, ExecutionErrorKind::Structural);
        assert!(err.message.contains("search_github"));
        assert_eq!(page.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_and_mistyped_arguments_are_structural() {
        let page = RecordingPage::new();
        let exec = SkillExecutor::default();
        let res = exec.execute(&page, SEARCH, "search_hn", &Map::new(), None).await;
        assert_eq!(res.error.unwrap().kind, ExecutionErrorKind::Structural);

        let res = exec.execute(&page, "not json", "f", &Map::new(), None).await;
        assert_eq!(res.error.unwrap().kind, ExecutionErrorKind::Structural);
        assert_eq!(page.call_count(), 0);
    }

    #[tokio::test]
    async fn page_error_is_runtime() {
        let page = RecordingPage::new().failing_on("input[type=submit]");
        let res = SkillExecutor::default()
            .execute(&page, SEARCH, "search_hn", &args(json!({"query": "rust"})), None)
            .await;
        let err = res.error.unwrap();
        assert_eq!(err.kind, ExecutionErrorKind::Runtime);
        assert!(err.message.contains("step 3 (click)"));
        assert_eq!(res.steps_completed, 2);
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let page = RecordingPage::new().panicking_on("input[name=q]");
        let res = SkillExecutor::default()
            .execute(&page, SEARCH, "search_hn", &args(json!({"query": "rust"})), None)
            .await;
        let err = res.error.unwrap();
        assert_eq!(err.kind, ExecutionErrorKind::Runtime);
        assert!(err.message.contains("panicked"));
    }

    #[tokio::test]
    async fn timeout_is_its_own_kind() {
        let page = RecordingPage::new().with_delay(Duration::from_millis(200));
        let res = SkillExecutor::default()
            .execute(
                &page,
                SEARCH,
                "search_hn",
                &args(json!({"query": "rust"})),
                Some(Duration::from_millis(20)),
            )
            .await;
        assert!(res.timed_out());
        assert!(!res.success);
    }

    #[tokio::test]
    async fn evaluate_result_and_locals() {
        let code = r##"{
            "function": "title",
            "steps": [
                {"op": "evaluate", "expr": "document.title", "store_as": "title"},
                {"op": "fill", "selector": "#echo", "value": "{{title}}"},
                {"op": "evaluate", "expr": "document.title.length"}
            ]
        }"##;
        let page = RecordingPage::new()
            .with_evaluation("document.title", json!("Hacker News"))
            .with_evaluation("document.title.length", json!(11));
        let res = SkillExecutor::default().execute(&page, code, "title", &Map::new(), None).await;
        assert!(res.success);
        assert_eq!(res.result, json!(11));
        assert!(page.calls().contains(&PageCall::Fill {
            selector: "#echo".into(),
            value: "Hacker News".into()
        }));
    }
}

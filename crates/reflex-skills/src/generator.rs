//! Drafting a skill script from a classified trajectory.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use reflex_config::LlmConfig;
use reflex_core::{
    ActionType, RecordedAction, RecordedTrajectory, ReflexError, Result, ScriptStep, SkillScript,
    Template,
};
use reflex_llm::{LlmProvider, parse_json, request_from_config};

use crate::classify::Classification;

/// Everything a generator gets for one attempt.
#[derive(Debug, Clone)]
pub struct GenerationRequest<'a> {
    pub trajectory: &'a RecordedTrajectory,
    pub classification: &'a Classification,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Why the previous draft was rejected, if this is a retry.
    pub previous_error: Option<String>,
}

/// Produces a candidate script. Verification happens elsewhere.
#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    fn name(&self) -> &str;

    /// Deterministic generators produce the same draft on every attempt,
    /// so retrying one after a rejection is pointless.
    fn deterministic(&self) -> bool {
        false
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<SkillScript>;
}

// ── Template generator ─────────────────────────────────────────

/// Maps each recorded action onto a script step, putting parameter
/// placeholders wherever a task-specific value was used.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateGenerator;

#[async_trait]
impl ScriptGenerator for TemplateGenerator {
    fn name(&self) -> &str {
        "template"
    }

    fn deterministic(&self) -> bool {
        true
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<SkillScript> {
        let c = request.classification;
        let steps = request
            .trajectory
            .actions
            .iter()
            .filter_map(|action| step_for(action, c))
            .collect();
        Ok(SkillScript {
            function: c.function_name.clone(),
            parameters: c.parameters(),
            steps,
        })
    }
}

fn step_for(action: &RecordedAction, c: &Classification) -> Option<ScriptStep> {
    let selector = action.selector.as_deref().map(Template::from);
    match action.action_type {
        ActionType::Navigate => Some(ScriptStep::Navigate {
            url: templated_url(&action.url, c),
        }),
        ActionType::Click => Some(ScriptStep::Click { selector: selector? }),
        ActionType::Input | ActionType::Select => {
            let literal = action.value.as_deref().unwrap_or_default();
            let value = match c.parameter_for(literal) {
                Some(param) => Template::param(&param.name),
                None => Template::from(literal),
            };
            Some(ScriptStep::Fill {
                selector: selector?,
                value,
            })
        }
        ActionType::Evaluate => Some(ScriptStep::Evaluate {
            expr: Template::from(action.value.as_deref()?),
            store_as: None,
        }),
        ActionType::WaitFor => Some(ScriptStep::WaitFor { selector: selector? }),
        ActionType::Screenshot => Some(ScriptStep::Screenshot),
        // Scrolling and key presses only mattered to the page the agent saw.
        ActionType::Scroll | ActionType::KeyPress => None,
    }
}

/// The navigation URL with task-specific query values replaced by placeholders.
fn templated_url(raw: &str, c: &Classification) -> Template {
    let Ok(mut parsed) = url::Url::parse(raw) else {
        return Template::from(raw);
    };
    let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
    if !pairs.iter().any(|(_, v)| c.parameter_for(v).is_some()) {
        return Template::from(raw);
    }

    let encode = |s: &str| url::form_urlencoded::byte_serialize(s.as_bytes()).collect::<String>();
    let query: Vec<String> = pairs
        .iter()
        .map(|(k, v)| match c.parameter_for(v) {
            Some(param) => format!("{}={}", encode(k), Template::param(&param.name)),
            None => format!("{}={}", encode(k), encode(v)),
        })
        .collect();
    parsed.set_query(None);
    parsed.set_fragment(None);
    Template::new(format!("{}?{}", parsed, query.join("&")))
}

// ── LLM generator ──────────────────────────────────────────────

const SYSTEM_PROMPT: &str = "You turn recorded browser sessions into reusable automation scripts. \
    Output only valid JSON.";

/// Asks the completion service to draft the script.
pub struct LlmGenerator {
    provider: Arc<dyn LlmProvider>,
    config: LlmConfig,
}

impl LlmGenerator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self { provider, config }
    }

    fn prompt(request: &GenerationRequest<'_>) -> Result<String> {
        let c = request.classification;
        let actions = serde_json::to_string_pretty(&request.trajectory.actions)?;
        let parameters = serde_json::to_string(&c.parameters())?;
        let mut prompt = format!(
            "Write a script that replays this browser session for similar tasks.\n\n\
             Task: {task}\n\
             Start URL: {url}\n\
             Recorded actions:\n{actions}\n\n\
             Use the function name \"{function}\" and these parameters: {parameters}\n\
             Reference a parameter inside any string with {{{{name}}}}. Every parameter \
             must be referenced at least once. Stay on the start URL's domain.\n\n\
             Output a JSON object of this shape:\n\
             {{\"function\": \"...\", \"parameters\": [{{\"name\": \"...\", \"type\": \"string|int|float|bool\"}}], \
             \"steps\": [{{\"op\": \"navigate\", \"url\": \"...\"}}, {{\"op\": \"click\", \"selector\": \"...\"}}, \
             {{\"op\": \"fill\", \"selector\": \"...\", \"value\": \"...\"}}, \
             {{\"op\": \"evaluate\", \"expr\": \"...\", \"store_as\": \"optional_name\"}}, \
             {{\"op\": \"wait_for\", \"selector\": \"...\"}}, {{\"op\": \"screenshot\"}}]}}\n",
            task = request.trajectory.task,
            url = request.trajectory.start_url,
            function = c.function_name,
        );
        if let Some(error) = &request.previous_error {
            prompt.push_str(&format!("\nYour previous script was rejected: {error}\nFix that problem.\n"));
        }
        Ok(prompt)
    }
}

#[async_trait]
impl ScriptGenerator for LlmGenerator {
    fn name(&self) -> &str {
        "llm"
    }

    async fn generate(&self, request: &GenerationRequest<'_>) -> Result<SkillScript> {
        let llm_request = request_from_config(&self.config, SYSTEM_PROMPT, Self::prompt(request)?);
        let secs = self.config.timeout_secs;
        let response = tokio::time::timeout(Duration::from_secs(secs), self.provider.complete(&llm_request))
            .await
            .map_err(|_| ReflexError::LlmTimeout { secs })??;
        debug!(
            provider = self.provider.name(),
            attempt = request.attempt,
            tokens = response.usage.total_tokens(),
            "script draft received"
        );
        parse_json(&response.text)
    }
}

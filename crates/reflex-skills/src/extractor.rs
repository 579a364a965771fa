//! Binding a skill's declared parameters to values from a new task's text.
//!
//! Pattern strategies run first and never leave the process: the skill's
//! description used as a template, quoted spans, then the residual phrase
//! left after removing the description's own words. The completion service
//! is only consulted when all of them are inconclusive.

use regex::{NoExpand, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::debug;

use reflex_config::{LlmConfig, ReflexConfig};
use reflex_core::{ReflexError, Result, Skill, SkillParameter};
use reflex_llm::{LlmProvider, parse_json, request_from_config};
use reflex_store::similarity::align;

static SLOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

static QUOTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"]+)"|“([^”]+)”|(?:^|\s)'([^']+)'"#).expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Pattern,
    Llm,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub success: bool,
    pub params: Map<String, Value>,
    pub method: ExtractionMethod,
    pub error: Option<String>,
}

impl ExtractionResult {
    fn bound(params: Map<String, Value>, method: ExtractionMethod) -> Self {
        Self {
            success: true,
            params,
            method,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            params: Map::new(),
            method: ExtractionMethod::None,
            error: Some(error.into()),
        }
    }
}

#[derive(Default)]
pub struct ParameterExtractor {
    llm: Option<(Arc<dyn LlmProvider>, LlmConfig)>,
}

impl ParameterExtractor {
    /// Pattern extraction only.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_llm(mut self, provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        self.llm = Some((provider, config));
        self
    }

    pub fn from_config(config: &ReflexConfig, provider: Option<Arc<dyn LlmProvider>>) -> Self {
        match provider {
            Some(provider) if config.extraction.llm_fallback => Self::new().with_llm(provider, config.llm.clone()),
            _ => Self::new(),
        }
    }

    pub fn has_llm_fallback(&self) -> bool {
        self.llm.is_some()
    }

    pub async fn extract(&self, task: &str, skill: &Skill) -> ExtractionResult {
        if let Some(params) = extract_by_pattern(task, &skill.description, &skill.parameters) {
            return ExtractionResult::bound(params, ExtractionMethod::Pattern);
        }
        let Some((provider, config)) = &self.llm else {
            return ExtractionResult::failed("no parameter pattern matched the task");
        };
        match extract_by_llm(provider.as_ref(), config, task, skill).await {
            Ok(params) => ExtractionResult::bound(params, ExtractionMethod::Llm),
            Err(e) => {
                debug!(skill = %skill.name, error = %e, "llm parameter extraction failed");
                ExtractionResult::failed(e.to_string())
            }
        }
    }
}

/// Run the pattern strategies in order, returning the first complete binding.
pub fn extract_by_pattern(task: &str, description: &str, parameters: &[SkillParameter]) -> Option<Map<String, Value>> {
    if parameters.is_empty() {
        return Some(Map::new());
    }
    match_template(task, description, parameters)
        .and_then(|values| bind(parameters, values))
        .or_else(|| quoted_spans(task, parameters.len()).and_then(|values| bind(parameters, values)))
        .or_else(|| residual_phrase(task, description, parameters.len()).and_then(|values| bind(parameters, values)))
}

/// Coerce raw values onto the declared parameters, in order.
fn bind(parameters: &[SkillParameter], values: Vec<String>) -> Option<Map<String, Value>> {
    if values.len() != parameters.len() {
        return None;
    }
    parameters
        .iter()
        .zip(values)
        .map(|(p, v)| {
            let value = p.param_type.coerce(&Value::String(v))?;
            Some((p.name.clone(), value))
        })
        .collect()
}

/// The description as a case-insensitive pattern, each `{slot}` a lazy group.
fn match_template(task: &str, description: &str, parameters: &[SkillParameter]) -> Option<Vec<String>> {
    let mut pattern = String::from(r"^\s*");
    let mut last = 0;
    for caps in SLOT.captures_iter(description) {
        let whole = caps.get(0)?;
        pattern.push_str(&literal_pattern(&description[last..whole.start()]));
        pattern.push_str(&format!("(?P<{}>.+?)", &caps[1]));
        last = whole.end();
    }
    pattern.push_str(&literal_pattern(&description[last..]));
    pattern.push_str(r"\s*[.!?]?\s*$");

    // Duplicate slot names fail to compile; fall through to other strategies.
    let re = RegexBuilder::new(&pattern).case_insensitive(true).build().ok()?;
    let caps = re.captures(task.trim())?;
    parameters
        .iter()
        .map(|p| caps.name(&p.name).map(|m| unquote(m.as_str()).to_string()))
        .collect()
}

fn literal_pattern(text: &str) -> String {
    WHITESPACE
        .replace_all(&regex::escape(text), NoExpand(r"\s+"))
        .into_owned()
}

fn unquote(s: &str) -> &str {
    let s = s.trim();
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”')] {
        if let Some(inner) = s.strip_prefix(open).and_then(|r| r.strip_suffix(close)) {
            return inner.trim();
        }
    }
    s
}

/// Quoted spans, bound in order when there is exactly one per parameter.
fn quoted_spans(task: &str, wanted: usize) -> Option<Vec<String>> {
    let spans: Vec<String> = QUOTED
        .captures_iter(task)
        .filter_map(|c| c.iter().skip(1).flatten().next().map(|m| m.as_str().trim().to_string()))
        .filter(|s| !s.is_empty())
        .collect();
    (spans.len() == wanted).then_some(spans)
}

/// What is left of the task once the description's words are removed.
/// Single-parameter skills only, and only when the task covers every fixed
/// word of the description and the leftover words form one contiguous run.
fn residual_phrase(task: &str, description: &str, wanted: usize) -> Option<Vec<String>> {
    if wanted != 1 {
        return None;
    }
    let alignment = align(task, description);
    if !alignment.fully_covered() {
        return None;
    }
    let tokens = &alignment.task_tokens;
    let leftover: Vec<usize> = (0..tokens.len())
        .filter(|&i| !alignment.explained[i] && !tokens[i].is_stop_word())
        .collect();
    let (&first, &last) = (leftover.first()?, leftover.last()?);
    let interrupted = (first..=last).any(|i| alignment.explained[i] && !tokens[i].is_stop_word());
    if interrupted {
        return None;
    }
    let phrase = unquote(&task[tokens[first].start..tokens[last].end]);
    Some(vec![phrase.to_string()])
}

const SYSTEM_PROMPT: &str = "You are a precise parameter extractor. Output only valid JSON.";

async fn extract_by_llm(
    provider: &dyn LlmProvider,
    config: &LlmConfig,
    task: &str,
    skill: &Skill,
) -> Result<Map<String, Value>> {
    let schema = serde_json::to_string(&skill.parameters)?;
    let prompt = format!(
        "Extract the argument values for a browser automation skill from a task.\n\n\
         Skill: {name} ({description})\n\
         Parameters: {schema}\n\
         Task: {task}\n\n\
         Output ONLY a JSON object mapping every parameter name to its value. \
         Use null for a parameter the task does not mention.\n",
        name = skill.name,
        description = skill.description,
    );
    let request = request_from_config(config, SYSTEM_PROMPT, prompt);
    let secs = config.timeout_secs;
    let response = tokio::time::timeout(Duration::from_secs(secs), provider.complete(&request))
        .await
        .map_err(|_| ReflexError::LlmTimeout { secs })??;
    let raw: Map<String, Value> = parse_json(&response.text)?;

    skill
        .parameters
        .iter()
        .map(|p| {
            let value = raw
                .get(&p.name)
                .filter(|v| !v.is_null())
                .ok_or_else(|| ReflexError::Extraction(format!("parameter '{}' missing from response", p.name)))?;
            let coerced = p.param_type.coerce(value).ok_or_else(|| {
                ReflexError::Extraction(format!("parameter '{}' is not a valid {}", p.name, p.param_type))
            })?;
            Ok((p.name.clone(), coerced))
        })
        .collect()
}

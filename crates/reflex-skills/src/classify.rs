//! Splitting a trajectory's literals into task-specific values and structure.
//!
//! A value typed into the page, or passed in a navigation query string, is
//! task-specific when it also appears in the task text: that is the part a
//! new task would change. Everything else (selectors, plain URLs, values the
//! task never mentions) is replayed verbatim.

use regex::{NoExpand, Regex, RegexBuilder};
use std::sync::LazyLock;

use reflex_core::{
    ActionType, ParamType, RecordedAction, RecordedTrajectory, SkillParameter, domain_of,
    script::is_identifier, site_label,
};

/// Field names that mean "the thing being searched for".
const SEARCH_NAMES: &[&str] = &[
    "q", "s", "search", "searchbox", "search_box", "search_query", "query", "keywords",
    "keyword", "term", "terms", "text",
];

const SEARCH_VERBS: &[&str] = &["search", "find", "look", "lookup", "query"];

static SELECTOR_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:name|id|placeholder|aria-label|data-testid)\s*[~|^$*]?=\s*["']?([A-Za-z][\w\- ]*)"#)
        .expect("valid regex")
});

static SELECTOR_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#([A-Za-z][\w\-]*)").expect("valid regex"));

static TRAILING_SITE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:on|at|in|from)\s+([A-Z][\w.]*(?:\s+[A-Z][\w.]*)*)\s*[.!?]?\s*$")
        .expect("valid regex")
});

/// A trajectory literal that varies with the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskValue {
    pub name: String,
    pub param_type: ParamType,
    /// The literal as it appeared in the trajectory.
    pub value: String,
}

impl TaskValue {
    pub fn parameter(&self) -> SkillParameter {
        SkillParameter::new(self.name.clone(), self.param_type)
    }
}

/// What synthesis knows about a trajectory before generating a script.
#[derive(Debug, Clone)]
pub struct Classification {
    pub function_name: String,
    /// The task with each parameter value replaced by `{name}`.
    pub description: String,
    pub domain: Option<String>,
    pub values: Vec<TaskValue>,
}

impl Classification {
    pub fn parameters(&self) -> Vec<SkillParameter> {
        self.values.iter().map(TaskValue::parameter).collect()
    }

    /// The parameter bound to `literal`, if it is task-specific.
    pub fn parameter_for(&self, literal: &str) -> Option<&TaskValue> {
        let literal = literal.trim();
        self.values.iter().find(|v| v.value.eq_ignore_ascii_case(literal))
    }
}

pub fn classify(trajectory: &RecordedTrajectory) -> Classification {
    let searchy = first_word(&trajectory.task)
        .map(|w| SEARCH_VERBS.contains(&w.as_str()))
        .unwrap_or(false);

    let mut values: Vec<TaskValue> = Vec::new();
    for action in &trajectory.actions {
        for (hint, literal) in candidate_literals(action) {
            let literal = literal.trim();
            if literal.is_empty() || !mentions(&trajectory.task, literal) {
                continue;
            }
            if values.iter().any(|v| v.value.eq_ignore_ascii_case(literal)) {
                continue;
            }
            let base = parameter_name(hint.as_deref(), searchy);
            let name = unique_name(&base, &values);
            values.push(TaskValue {
                name,
                param_type: ParamType::infer(literal),
                value: literal.to_string(),
            });
        }
    }

    let domain = domain_of(&trajectory.start_url);
    Classification {
        function_name: function_name(&trajectory.task, domain.as_deref(), &values),
        description: describe(&trajectory.task, &values),
        domain,
        values,
    }
}

/// `(name hint, literal)` pairs an action could contribute as parameters.
fn candidate_literals(action: &RecordedAction) -> Vec<(Option<String>, String)> {
    match action.action_type {
        ActionType::Input | ActionType::Select => action
            .value
            .iter()
            .map(|v| (action.selector.as_deref().and_then(name_from_selector), v.clone()))
            .collect(),
        ActionType::Navigate => match url::Url::parse(&action.url) {
            Ok(url) => url
                .query_pairs()
                .map(|(k, v)| (Some(k.into_owned()), v.into_owned()))
                .collect(),
            Err(_) => vec![],
        },
        _ => vec![],
    }
}

/// A field name found in a CSS selector, e.g. `q` in `input[name=q]`.
pub fn name_from_selector(selector: &str) -> Option<String> {
    SELECTOR_NAME
        .captures(selector)
        .or_else(|| SELECTOR_ID.captures(selector))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn snake_case(raw: &str) -> String {
    let mut out = String::new();
    let mut prev_lower = false;
    for c in raw.chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() && prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        } else {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower = false;
        }
    }
    out.trim_matches('_').to_string()
}

fn parameter_name(hint: Option<&str>, searchy: bool) -> String {
    let name = hint.map(snake_case).unwrap_or_default();
    if SEARCH_NAMES.contains(&name.as_str()) || (name.is_empty() && searchy) {
        return "query".into();
    }
    if is_identifier(&name) {
        name
    } else {
        "value".into()
    }
}

fn unique_name(base: &str, taken: &[TaskValue]) -> String {
    let free = |n: &str| !taken.iter().any(|v| v.name == n);
    if free(base) {
        return base.to_string();
    }
    (2..)
        .map(|i| format!("{base}_{i}"))
        .find(|n| free(n))
        .unwrap_or_else(|| base.to_string())
}

fn first_word(task: &str) -> Option<String> {
    task.split(|c: char| !c.is_alphanumeric())
        .find(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
}

/// `{verb}_{site}`: the task's first word and either the site named at the
/// end of the task ("on Hacker News" ⇒ `hn`) or the domain's label.
pub fn function_name(task: &str, domain: Option<&str>, values: &[TaskValue]) -> String {
    let verb = first_word(task).map(|w| snake_case(&w)).unwrap_or_default();
    let verb = if verb.is_empty() { "run".to_string() } else { verb };

    let named_site = TRAILING_SITE
        .captures(task)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|site| !values.iter().any(|v| mentions(site, &v.value)))
        .map(|site| {
            let words: Vec<&str> = site.split_whitespace().collect();
            if words.len() > 1 {
                words
                    .iter()
                    .filter_map(|w| w.chars().next())
                    .map(|c| c.to_ascii_lowercase())
                    .collect()
            } else {
                site.chars()
                    .filter(char::is_ascii_alphanumeric)
                    .collect::<String>()
                    .to_lowercase()
            }
        });

    let site = named_site
        .or_else(|| domain.map(|d| snake_case(site_label(d))))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "site".into());

    let name = if verb == site { verb } else { format!("{verb}_{site}") };
    if is_identifier(&name) {
        name
    } else {
        format!("skill_{name}")
    }
}

/// The task with parameter values replaced by `{name}` slots.
pub fn describe(task: &str, values: &[TaskValue]) -> String {
    let mut ordered: Vec<&TaskValue> = values.iter().collect();
    // Longest first, so "machine learning" wins over "learning".
    ordered.sort_by_key(|v| std::cmp::Reverse(v.value.len()));

    let mut description = task.trim().to_string();
    for v in ordered {
        if let Some(re) = literal_regex(&v.value) {
            let slot = format!("{{{}}}", v.name);
            description = re.replace_all(&description, NoExpand(&slot)).into_owned();
        }
    }
    description
}

/// Case-insensitive match of `literal` as whole words: "rust" never matches
/// inside "Trustpilot". Edges that are punctuation ("C++") match as-is.
fn literal_regex(literal: &str) -> Option<Regex> {
    let wordy = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
    let mut pattern = regex::escape(literal);
    if wordy(literal.chars().next()) {
        pattern.insert_str(0, r"\b");
    }
    if wordy(literal.chars().last()) {
        pattern.push_str(r"\b");
    }
    RegexBuilder::new(&pattern).case_insensitive(true).build().ok()
}

fn mentions(text: &str, literal: &str) -> bool {
    literal_regex(literal).is_some_and(|re| re.is_match(text))
}

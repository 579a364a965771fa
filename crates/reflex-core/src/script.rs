//! The action-script language skills are compiled into.
//!
//! A skill's `code` is a JSON document describing a single function: its name,
//! its declared parameters, and an ordered list of page operations. String
//! arguments are templates that may reference parameters (or values stored by
//! earlier `evaluate` steps) with `{{name}}` placeholders.
//!
//! ```json
//! {
//!   "function": "search_hn",
//!   "parameters": [{"name": "query", "type": "string"}],
//!   "steps": [
//!     {"op": "fill", "selector": "input[name=q]", "value": "{{query}}"},
//!     {"op": "click", "selector": "input[type=submit]"}
//!   ]
//! }
//! ```
//!
//! Scripts are data, not code: the executor interprets them with an exhaustive
//! match over [`ScriptStep`], so nothing generated by a model is ever run.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{ReflexError, Result};
use crate::skill::SkillParameter;

/// A string with `{{name}}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Template(pub String);

/// One piece of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

impl Template {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// A template holding a single placeholder.
    pub fn param(name: &str) -> Self {
        Self(format!("{{{{{name}}}}}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    fn segments(&self) -> Vec<Segment<'_>> {
        let mut out = Vec::new();
        let mut rest = self.0.as_str();
        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                break;
            };
            let name = after[..end].trim();
            if !is_identifier(name) {
                // Not a placeholder; keep the braces as literal text.
                out.push(Segment::Literal(&rest[..start + 2]));
                rest = after;
                continue;
            }
            if start > 0 {
                out.push(Segment::Literal(&rest[..start]));
            }
            out.push(Segment::Placeholder(name));
            rest = &after[end + 2..];
        }
        if !rest.is_empty() {
            out.push(Segment::Literal(rest));
        }
        out
    }

    /// Names referenced by this template, in order of appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        self.segments()
            .into_iter()
            .filter_map(|s| match s {
                Segment::Placeholder(name) => Some(name),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Substitute placeholders from `scope`. When `encode` is set, substituted
    /// values are form-urlencoded (for use inside URLs).
    pub fn render(&self, scope: &HashMap<String, Value>, encode: bool) -> Result<String> {
        self.render_with(scope, |value| {
            let text = value_to_text(value);
            if encode {
                url::form_urlencoded::byte_serialize(text.as_bytes()).collect()
            } else {
                text
            }
        })
    }

    /// Substitute placeholders as JSON literals, for script expressions.
    pub fn render_json(&self, scope: &HashMap<String, Value>) -> Result<String> {
        self.render_with(scope, |value| value.to_string())
    }

    fn render_with(
        &self,
        scope: &HashMap<String, Value>,
        format: impl Fn(&Value) -> String,
    ) -> Result<String> {
        let mut out = String::with_capacity(self.0.len());
        for segment in self.segments() {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(name) => {
                    let value = scope
                        .get(name)
                        .ok_or_else(|| ReflexError::Script(format!("unbound variable '{name}'")))?;
                    out.push_str(&format(value));
                }
            }
        }
        Ok(out)
    }
}

impl From<&str> for Template {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Render a JSON value the way it should appear when typed into a page.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A single page operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptStep {
    Navigate {
        url: Template,
    },
    Click {
        selector: Template,
    },
    Fill {
        selector: Template,
        value: Template,
    },
    Evaluate {
        expr: Template,
        /// Bind the evaluation result to a local name for later steps.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        store_as: Option<String>,
    },
    WaitFor {
        selector: Template,
    },
    Screenshot,
}

impl ScriptStep {
    pub fn op_name(&self) -> &'static str {
        match self {
            ScriptStep::Navigate { .. } => "navigate",
            ScriptStep::Click { .. } => "click",
            ScriptStep::Fill { .. } => "fill",
            ScriptStep::Evaluate { .. } => "evaluate",
            ScriptStep::WaitFor { .. } => "wait_for",
            ScriptStep::Screenshot => "screenshot",
        }
    }

    /// All templates carried by this step.
    pub fn templates(&self) -> Vec<&Template> {
        match self {
            ScriptStep::Navigate { url } => vec![url],
            ScriptStep::Click { selector } | ScriptStep::WaitFor { selector } => vec![selector],
            ScriptStep::Fill { selector, value } => vec![selector, value],
            ScriptStep::Evaluate { expr, .. } => vec![expr],
            ScriptStep::Screenshot => vec![],
        }
    }
}

/// A complete skill program: one named function over a list of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillScript {
    pub function: String,
    #[serde(default)]
    pub parameters: Vec<SkillParameter>,
    pub steps: Vec<ScriptStep>,
}

impl SkillScript {
    pub fn parse(code: &str) -> Result<Self> {
        serde_json::from_str(code)
            .map_err(|e| ReflexError::Script(format!("invalid skill script: {e}")))
    }

    pub fn to_code(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Every placeholder referenced anywhere in the script, in step order.
    pub fn referenced_names(&self) -> Vec<&str> {
        self.steps
            .iter()
            .flat_map(|s| s.templates())
            .flat_map(|t| t.placeholders())
            .collect()
    }

    pub fn parameter(&self, name: &str) -> Option<&SkillParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

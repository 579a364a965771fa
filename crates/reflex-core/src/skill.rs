use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{SkillId, TrajectoryId};

/// The closed set of parameter types a skill may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    #[serde(alias = "str")]
    String,
    Int,
    Float,
    Bool,
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParamType::String => "string",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for ParamType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "string" | "str" | "text" => Ok(ParamType::String),
            "int" | "integer" => Ok(ParamType::Int),
            "float" | "number" | "double" => Ok(ParamType::Float),
            "bool" | "boolean" => Ok(ParamType::Bool),
            other => Err(format!("unknown parameter type '{other}'")),
        }
    }
}

impl ParamType {
    /// Infer a type from a literal value. Conservative: numeric and boolean
    /// only when the literal is unambiguous, string otherwise.
    pub fn infer(literal: &str) -> Self {
        let s = literal.trim();
        if s.is_empty() || s != literal {
            return ParamType::String;
        }
        let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            // Leading zeros usually mean an identifier (zip codes, ids).
            if digits.len() > 1 && digits.starts_with('0') {
                return ParamType::String;
            }
            return ParamType::Int;
        }
        if let Some((int_part, frac_part)) = digits.split_once('.') {
            let all_digits = |p: &str| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit());
            if all_digits(int_part) && all_digits(frac_part) {
                return ParamType::Float;
            }
        }
        match s {
            "true" | "false" => ParamType::Bool,
            _ => ParamType::String,
        }
    }

    /// Coerce a JSON value to this type, accepting string spellings of
    /// numbers and booleans. Returns `None` when the value does not fit.
    pub fn coerce(&self, value: &Value) -> Option<Value> {
        match (self, value) {
            (ParamType::String, Value::String(_)) => Some(value.clone()),
            (ParamType::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (ParamType::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (ParamType::Int, Value::Number(n)) => n.as_i64().map(Value::from),
            (ParamType::Int, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (ParamType::Float, Value::Number(n)) => n.as_f64().map(Value::from),
            (ParamType::Float, Value::String(s)) => s.trim().parse::<f64>().ok().map(Value::from),
            (ParamType::Bool, Value::Bool(_)) => Some(value.clone()),
            (ParamType::Bool, Value::String(s)) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" => Some(Value::Bool(true)),
                "false" | "no" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }
}

/// A declared skill parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ParamType,
}

impl SkillParameter {
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::String)
    }
}

/// A named, parameterized, verified procedure synthesized from one trajectory.
///
/// `code` and `parameters` never change after creation; only the reliability
/// fields move, and only through the store's confidence update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub id: SkillId,
    pub name: String,
    pub description: String,
    /// Serialized [`crate::SkillScript`].
    pub code: String,
    pub domain: String,
    pub parameters: Vec<SkillParameter>,
    /// Revision number within `(domain, name)`, starting at 1.
    pub version: u32,
    pub confidence: f64,
    pub success_count: u64,
    pub failure_count: u64,
    #[serde(default)]
    pub source_trajectory_id: Option<TrajectoryId>,
    /// Set when a newer revision with the same name exists in the domain.
    #[serde(default)]
    pub superseded_by: Option<SkillId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Skill {
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| format!("{}: {}", p.name, p.param_type))
            .collect();
        format!("{}({})", self.name, params.join(", "))
    }

    pub fn total_runs(&self) -> u64 {
        self.success_count + self.failure_count
    }

    pub fn is_latest(&self) -> bool {
        self.superseded_by.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn infer_is_conservative() {
        assert_eq!(ParamType::infer("42"), ParamType::Int);
        assert_eq!(ParamType::infer("-7"), ParamType::Int);
        assert_eq!(ParamType::infer("3.25"), ParamType::Float);
        assert_eq!(ParamType::infer("true"), ParamType::Bool);
        assert_eq!(ParamType::infer("machine learning"), ParamType::String);
        assert_eq!(ParamType::infer("02139"), ParamType::String);
        assert_eq!(ParamType::infer("1.2.3"), ParamType::String);
        assert_eq!(ParamType::infer("True"), ParamType::String);
        assert_eq!(ParamType::infer(" 5"), ParamType::String);
        assert_eq!(ParamType::infer(""), ParamType::String);
    }

    #[test]
    fn coerce_values() {
        assert_eq!(ParamType::Int.coerce(&json!("12")), Some(json!(12)));
        assert_eq!(ParamType::Int.coerce(&json!("twelve")), None);
        assert_eq!(ParamType::Float.coerce(&json!(2)), Some(json!(2.0)));
        assert_eq!(ParamType::Bool.coerce(&json!("yes")), Some(json!(true)));
        assert_eq!(ParamType::String.coerce(&json!(5)), Some(json!("5")));
        assert_eq!(ParamType::String.coerce(&json!(null)), None);
    }

    #[test]
    fn parameter_serde_uses_type_key() {
        let p = SkillParameter::string("query");
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v, json!({"name": "query", "type": "string"}));
        let parsed: SkillParameter = serde_json::from_value(json!({"name": "q", "type": "str"})).unwrap();
        assert_eq!(parsed.param_type, ParamType::String);
    }

    #[test]
    fn param_type_from_str() {
        assert_eq!("integer".parse::<ParamType>(), Ok(ParamType::Int));
        assert!("list".parse::<ParamType>().is_err());
    }
}

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration, maps to `reflex.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflexConfig {
    pub store: StoreConfig,
    pub matching: MatchingConfig,
    pub confidence: ConfidenceConfig,
    pub router: RouterConfig,
    pub synthesis: SynthesisConfig,
    pub extraction: ExtractionConfig,
    pub executor: ExecutorConfig,
    pub llm: LlmConfig,
    pub logging: LoggingConfig,
}

// ── Store ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the SQLite database.
    pub db_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".reflex")
                .join("knowledge.db"),
        }
    }
}

// ── Trajectory matching ────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Minimum same-domain confidence for a trajectory search to report `matched`.
    pub trajectory_match_threshold: f64,
    /// Upper bound for non-exact matches. Exact (task, url) matches score 1.0.
    pub partial_match_ceiling: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            trajectory_match_threshold: 0.5,
            partial_match_ceiling: 0.95,
        }
    }
}

// ── Confidence model ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Confidence assigned to a freshly synthesized skill.
    pub initial: f64,
    /// Fraction of the remaining headroom gained on a successful replay.
    pub success_rate: f64,
    /// Fraction of the current confidence lost on a failed replay.
    /// Must be larger than `success_rate`.
    pub failure_rate: f64,
    /// Skills below this confidence are excluded from candidate search.
    pub prune_floor: f64,
    /// Skills at or above this confidence count as reliable in stats.
    pub reliable_threshold: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            initial: 0.5,
            success_rate: 0.1,
            failure_rate: 0.3,
            prune_floor: 0.2,
            reliable_threshold: 0.7,
        }
    }
}

// ── Router ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// A skill is eligible for the fast path only if its blended
    /// similarity × confidence score exceeds this threshold.
    pub skill_threshold: f64,
    /// Maximum number of skill candidates considered per route.
    pub max_candidates: usize,
    /// Budget for the store lookups of a single route call.
    pub lookup_timeout_ms: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            skill_threshold: 0.35,
            max_candidates: 5,
            lookup_timeout_ms: 2_000,
        }
    }
}

// ── Synthesis ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Regeneration attempts after the first failed verification.
    pub max_retries: u32,
    /// Draft scripts with the completion service instead of the
    /// deterministic template generator (requires `[llm]`).
    pub use_llm: bool,
    /// Upper bound on the number of steps in a synthesized script.
    pub max_steps: usize,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            use_llm: false,
            max_steps: 50,
        }
    }
}

// ── Parameter extraction ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Ask the completion service when pattern extraction is inconclusive.
    pub llm_fallback: bool,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self { llm_fallback: true }
    }
}

// ── Executor ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Wall-clock budget for one skill run.
    pub default_timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 30_000,
        }
    }
}

// ── Completion service ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider kind. Only "openai" (any OpenAI-compatible endpoint) is built in.
    pub provider: String,
    pub base_url: String,
    /// API key; falls back to `OPENAI_API_KEY`.
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".into(),
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            model: "gpt-4o-mini".into(),
            timeout_secs: 30,
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

impl LlmConfig {
    /// Whether enough is configured to construct a provider.
    pub fn is_configured(&self) -> bool {
        self.api_key.as_deref().is_some_and(|k| !k.is_empty()) && !self.model.is_empty()
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let icon = match self.severity {
            WarningSeverity::Error => "❌",
            WarningSeverity::Warning => "⚠️ ",
            WarningSeverity::Info => "💡",
        };
        write!(f, "{} {}: {}", icon, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

fn unit_interval(warnings: &mut Vec<ConfigWarning>, field: &str, value: f64) {
    if !(0.0..=1.0).contains(&value) || value.is_nan() {
        warnings.push(ConfigWarning {
            field: field.into(),
            message: format!("{value} is outside [0, 1]"),
            severity: WarningSeverity::Error,
            hint: None,
        });
    }
}

impl ReflexConfig {
    /// Check the configuration. Returns all findings; the caller decides
    /// what to do with non-fatal ones. `Err` carries the Error-severity
    /// findings joined into one message.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let warnings = self.findings();
        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| w.to_string())
            .collect();
        if errors.is_empty() {
            Ok(warnings)
        } else {
            Err(errors.join("\n"))
        }
    }

    /// Every finding, of any severity.
    pub fn findings(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        // ── Unit-interval knobs ───
        unit_interval(&mut warnings, "matching.trajectory_match_threshold", self.matching.trajectory_match_threshold);
        unit_interval(&mut warnings, "matching.partial_match_ceiling", self.matching.partial_match_ceiling);
        unit_interval(&mut warnings, "confidence.initial", self.confidence.initial);
        unit_interval(&mut warnings, "confidence.success_rate", self.confidence.success_rate);
        unit_interval(&mut warnings, "confidence.failure_rate", self.confidence.failure_rate);
        unit_interval(&mut warnings, "confidence.prune_floor", self.confidence.prune_floor);
        unit_interval(&mut warnings, "confidence.reliable_threshold", self.confidence.reliable_threshold);
        unit_interval(&mut warnings, "router.skill_threshold", self.router.skill_threshold);

        // ── Partial matches must stay below exact ones ───
        if self.matching.partial_match_ceiling >= 1.0 {
            warnings.push(ConfigWarning {
                field: "matching.partial_match_ceiling".into(),
                message: "partial matches would be indistinguishable from exact matches".into(),
                severity: WarningSeverity::Error,
                hint: Some("Use a value below 1.0, e.g. 0.95".into()),
            });
        }

        // ── Failure-biased confidence ───
        if self.confidence.failure_rate <= self.confidence.success_rate {
            warnings.push(ConfigWarning {
                field: "confidence.failure_rate".into(),
                message: format!(
                    "failure_rate {} must be larger than success_rate {}",
                    self.confidence.failure_rate, self.confidence.success_rate
                ),
                severity: WarningSeverity::Error,
                hint: Some("A single failure should undo several successes, e.g. 0.3 vs 0.1".into()),
            });
        }
        if self.confidence.success_rate == 0.0 {
            warnings.push(ConfigWarning {
                field: "confidence.success_rate".into(),
                message: "skills will never gain confidence".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }
        if self.confidence.prune_floor >= self.confidence.reliable_threshold {
            warnings.push(ConfigWarning {
                field: "confidence.prune_floor".into(),
                message: "prune floor is not below the reliable threshold".into(),
                severity: WarningSeverity::Error,
                hint: Some("Typical values: prune_floor = 0.2, reliable_threshold = 0.7".into()),
            });
        }
        if self.confidence.initial < self.confidence.prune_floor {
            warnings.push(ConfigWarning {
                field: "confidence.initial".into(),
                message: "new skills would start out pruned".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        // ── Router ───
        if self.router.max_candidates == 0 {
            warnings.push(ConfigWarning {
                field: "router.max_candidates".into(),
                message: "max_candidates is 0, so the fast path can never be taken".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set to e.g. 5".into()),
            });
        }

        // ── Synthesis ───
        if self.synthesis.max_steps == 0 {
            warnings.push(ConfigWarning {
                field: "synthesis.max_steps".into(),
                message: "max_steps is 0, so every script would be rejected".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }
        if self.synthesis.use_llm && !self.llm.is_configured() {
            warnings.push(ConfigWarning {
                field: "synthesis.use_llm".into(),
                message: "LLM synthesis requested but [llm] has no api_key".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set llm.api_key or OPENAI_API_KEY; the template generator is used meanwhile".into()),
            });
        }

        // ── Executor ───
        if self.executor.default_timeout_ms == 0 {
            warnings.push(ConfigWarning {
                field: "executor.default_timeout_ms".into(),
                message: "timeout is 0, so every skill run would time out".into(),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }

        // ── LLM ───
        if self.llm.provider != "openai" {
            warnings.push(ConfigWarning {
                field: "llm.provider".into(),
                message: format!("unknown provider '{}'", self.llm.provider),
                severity: WarningSeverity::Warning,
                hint: Some("Only OpenAI-compatible endpoints are supported; point llm.base_url at yours".into()),
            });
        }
        if self.llm.temperature < 0.0 || self.llm.temperature > 2.0 {
            warnings.push(ConfigWarning {
                field: "llm.temperature".into(),
                message: format!("temperature {} is out of range", self.llm.temperature),
                severity: WarningSeverity::Error,
                hint: Some("Temperature must be between 0.0 and 2.0".into()),
            });
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown log format '{}'", self.logging.format),
                severity: WarningSeverity::Warning,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        warnings
    }
}

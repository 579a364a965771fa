//! Turning one successful trajectory into a verified, parameterized skill.
//!
//! Synthesis is a small state machine:
//!
//! ```text
//! Generate ──▶ Verify ──▶ Accept
//!    ▲            │
//!    └── Retry ◀──┘ ──▶ Reject (budget exhausted)
//! ```
//!
//! Nothing is persisted unless the machine ends in `Accept`.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use reflex_config::{ReflexConfig, SynthesisConfig};
use reflex_core::{RecordedTrajectory, ReflexError, Result, Skill, SkillParameter, SkillScript};
use reflex_llm::LlmProvider;
use reflex_store::{KnowledgeStore, NewSkill};

use crate::classify::{Classification, classify};
use crate::generator::{GenerationRequest, LlmGenerator, ScriptGenerator, TemplateGenerator};
use crate::verifier::Verifier;

/// Outcome of one synthesis run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub success: bool,
    pub function_name: String,
    pub parameters: Vec<SkillParameter>,
    /// Serialized script; empty unless `success`.
    pub code: String,
    pub description: String,
    pub domain: Option<String>,
    /// Generation attempts made (0 when rejected up front).
    pub attempts: u32,
    pub error: Option<String>,
}

impl SynthesisResult {
    fn rejected(classification: &Classification, attempts: u32, reason: String) -> Self {
        Self {
            success: false,
            function_name: classification.function_name.clone(),
            parameters: classification.parameters(),
            code: String::new(),
            description: classification.description.clone(),
            domain: classification.domain.clone(),
            attempts,
            error: Some(reason),
        }
    }

    /// Why synthesis failed, as an error. `None` on success.
    pub fn rejection(&self) -> Option<ReflexError> {
        (!self.success).then(|| ReflexError::Synthesis {
            attempts: self.attempts,
            reason: self.error.clone().unwrap_or_else(|| "unknown reason".into()),
        })
    }
}

/// A synthesis result and, when it was accepted, the persisted skill.
#[derive(Debug, Clone)]
pub struct SynthesisOutcome {
    pub result: SynthesisResult,
    pub skill: Option<Skill>,
}

enum State {
    Generate { attempt: u32, previous_error: Option<String> },
    Verify { attempt: u32, script: SkillScript },
    Retry { attempt: u32, reason: String },
    Accept { attempt: u32, script: SkillScript },
    Reject { attempts: u32, reason: String },
}

pub struct SkillSynthesizer {
    generator: Arc<dyn ScriptGenerator>,
    verifier: Verifier,
    max_retries: u32,
}

impl SkillSynthesizer {
    /// A synthesizer using the deterministic template generator.
    pub fn new(config: &SynthesisConfig) -> Self {
        Self {
            generator: Arc::new(TemplateGenerator),
            verifier: Verifier::new(config.max_steps),
            max_retries: config.max_retries,
        }
    }

    pub fn with_generator(mut self, generator: Arc<dyn ScriptGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Use the completion service when `[synthesis].use_llm` is set and a
    /// provider is available, the template generator otherwise.
    pub fn from_config(config: &ReflexConfig, provider: Option<Arc<dyn LlmProvider>>) -> Self {
        let synthesizer = Self::new(&config.synthesis);
        match (config.synthesis.use_llm, provider) {
            (true, Some(provider)) => {
                synthesizer.with_generator(Arc::new(LlmGenerator::new(provider, config.llm.clone())))
            }
            (true, None) => {
                warn!("synthesis.use_llm is set but no completion service is configured, using templates");
                synthesizer
            }
            (false, _) => synthesizer,
        }
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    pub async fn synthesize(&self, trajectory: &RecordedTrajectory) -> SynthesisResult {
        let classification = classify(trajectory);

        if !trajectory.success {
            return SynthesisResult::rejected(&classification, 0, "trajectory did not succeed".into());
        }
        let Some(domain) = classification.domain.clone() else {
            return SynthesisResult::rejected(
                &classification,
                0,
                format!("no domain in start URL '{}'", trajectory.start_url),
            );
        };

        let max_attempts = self.max_retries + 1;
        let mut state = State::Generate {
            attempt: 1,
            previous_error: None,
        };
        loop {
            state = match state {
                State::Generate {
                    attempt,
                    previous_error,
                } => {
                    let request = GenerationRequest {
                        trajectory,
                        classification: &classification,
                        attempt,
                        previous_error,
                    };
                    match self.generator.generate(&request).await {
                        Ok(script) => State::Verify { attempt, script },
                        Err(e) => State::Retry {
                            attempt,
                            reason: e.to_string(),
                        },
                    }
                }
                State::Verify { attempt, script } => {
                    let mut violations = self.verifier.verify(&script, Some(domain.as_str()));
                    violations.extend(self.verifier.verify_signature(
                        &script,
                        &classification.function_name,
                        &classification.parameters(),
                    ));
                    if violations.is_empty() {
                        State::Accept { attempt, script }
                    } else {
                        let reason = violations
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join("; ");
                        State::Retry { attempt, reason }
                    }
                }
                State::Retry { attempt, reason } => {
                    debug!(
                        generator = self.generator.name(),
                        attempt,
                        reason = %reason,
                        "synthesis draft rejected"
                    );
                    if attempt >= max_attempts || self.generator.deterministic() {
                        State::Reject {
                            attempts: attempt,
                            reason,
                        }
                    } else {
                        State::Generate {
                            attempt: attempt + 1,
                            previous_error: Some(reason),
                        }
                    }
                }
                State::Accept { attempt, script } => {
                    return match script.to_code() {
                        Ok(code) => {
                            info!(
                                skill = %script.function,
                                domain = %domain,
                                attempts = attempt,
                                "skill synthesized"
                            );
                            SynthesisResult {
                                success: true,
                                function_name: classification.function_name.clone(),
                                parameters: classification.parameters(),
                                code,
                                description: classification.description.clone(),
                                domain: Some(domain),
                                attempts: attempt,
                                error: None,
                            }
                        }
                        Err(e) => SynthesisResult::rejected(&classification, attempt, e.to_string()),
                    };
                }
                State::Reject { attempts, reason } => {
                    warn!(task = %trajectory.task, attempts, reason = %reason, "skill synthesis rejected");
                    return SynthesisResult::rejected(&classification, attempts, reason);
                }
            };
        }
    }

    /// Synthesize and, only when verification passed, persist the skill.
    /// Storage errors propagate; synthesis failures are reported in the result.
    pub async fn synthesize_and_save(
        &self,
        store: &KnowledgeStore,
        trajectory: &RecordedTrajectory,
        trajectory_id: Option<&str>,
    ) -> Result<SynthesisOutcome> {
        let result = self.synthesize(trajectory).await;
        let (true, Some(domain)) = (result.success, result.domain.clone()) else {
            return Ok(SynthesisOutcome { result, skill: None });
        };
        let skill = store.save_skill(NewSkill {
            name: result.function_name.clone(),
            description: result.description.clone(),
            code: result.code.clone(),
            domain,
            parameters: result.parameters.clone(),
            source_trajectory_id: trajectory_id.map(str::to_string),
        })?;
        Ok(SynthesisOutcome {
            result,
            skill: Some(skill),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reflex_core::TrajectoryRecorder;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn hn(success: bool) -> RecordedTrajectory {
        let mut rec = TrajectoryRecorder::new(
            "Search for machine learning on Hacker News",
            "https://news.ycombinator.com",
        );
        rec.navigate("https://news.ycombinator.com");
        rec.click("input[name=q]");
        rec.input("input[name=q]", "machine learning");
        rec.click("input[type=submit]");
        rec.finish(success, None)
    }

    /// Fails verification until the given attempt.
    struct Flaky {
        good_from: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ScriptGenerator for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn generate(&self, request: &GenerationRequest<'_>) -> Result<SkillScript> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if request.attempt == 1 {
                return Err(ReflexError::Llm("response contains no JSON".into()));
            }
            let value = if request.attempt >= self.good_from { "{{query}}" } else { "rust" };
            Ok(SkillScript {
                function: "search_hn".into(),
                parameters: vec![SkillParameter::string("query")],
                steps: serde_json::from_value(serde_json::json!([
                    {"op": "fill", "selector": "input[name=q]", "value": value}
                ]))
                .unwrap(),
            })
        }
    }

    #[tokio::test]
    async fn template_synthesis() {
        let synth = SkillSynthesizer::new(&SynthesisConfig::default());
        let result = synth.synthesize(&hn(true)).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.function_name, "search_hn");
        assert_eq!(result.parameters, vec![SkillParameter::string("query")]);
        assert_eq!(result.description, "Search for {query} on Hacker News");
        assert_eq!(result.attempts, 1);
        assert!(result.rejection().is_none());
        let script = SkillScript::parse(&result.code).unwrap();
        assert_eq!(script.steps.len(), 4);
    }

    #[tokio::test]
    async fn failed_trajectory_is_rejected_up_front() {
        let synth = SkillSynthesizer::new(&SynthesisConfig::default());
        let result = synth.synthesize(&hn(false)).await;
        assert!(!result.success);
        assert_eq!(result.attempts, 0);
        assert!(result.code.is_empty());
    }

    #[tokio::test]
    async fn retries_until_verified() {
        let flaky = Arc::new(Flaky {
            good_from: 3,
            calls: AtomicU32::new(0),
        });
        let synth = SkillSynthesizer::new(&SynthesisConfig::default()).with_generator(flaky.clone());
        let result = synth.synthesize(&hn(true)).await;
        assert!(result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_budget_rejects() {
        let flaky = Arc::new(Flaky {
            good_from: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let config = SynthesisConfig {
            max_retries: 2,
            ..Default::default()
        };
        let synth = SkillSynthesizer::new(&config).with_generator(flaky.clone());
        let result = synth.synthesize(&hn(true)).await;
        assert!(!result.success);
        assert_eq!(result.attempts, 3);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        assert!(result.error.as_deref().unwrap().contains("parameter 'query' is never referenced"));
        assert!(matches!(result.rejection(), Some(ReflexError::Synthesis { attempts: 3, .. })));
    }

    #[tokio::test]
    async fn nothing_persisted_on_rejection() {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let synth = SkillSynthesizer::new(&SynthesisConfig::default());
        let outcome = synth.synthesize_and_save(&store, &hn(false), None).await.unwrap();
        assert!(outcome.skill.is_none());
        assert_eq!(store.get_skill_stats().unwrap().total, 0);

        let outcome = synth.synthesize_and_save(&store, &hn(true), Some("t-1")).await.unwrap();
        let skill = outcome.skill.unwrap();
        assert_eq!(skill.domain, "news.ycombinator.com");
        assert_eq!(skill.source_trajectory_id.as_deref(), Some("t-1"));
    }
}

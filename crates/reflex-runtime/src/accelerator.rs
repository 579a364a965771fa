use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use reflex_config::ReflexConfig;
use reflex_core::types::{SessionId, TrajectoryId};
use reflex_core::{Event, EventBus, Page, RecordedTrajectory, Result, Skill};
use reflex_llm::LlmProvider;
use reflex_skills::{ExecutionResult, ParameterExtractor, SkillExecutor, SkillSynthesizer, SynthesisResult};
use reflex_store::{ConfidenceUpdate, KnowledgeStore};

use crate::router::{RouteDecision, SmartRouter};

/// What happened on a fast-path attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FastPathOutcome {
    /// The router chose the normal path; nothing ran.
    Skipped { decision: RouteDecision },
    Completed {
        decision: RouteDecision,
        execution: ExecutionResult,
        confidence: f64,
    },
    /// The skill ran and failed. The caller should fall back to the normal path.
    Failed {
        decision: RouteDecision,
        execution: ExecutionResult,
        confidence: f64,
    },
}

impl FastPathOutcome {
    pub fn decision(&self) -> &RouteDecision {
        match self {
            FastPathOutcome::Skipped { decision }
            | FastPathOutcome::Completed { decision, .. }
            | FastPathOutcome::Failed { decision, .. } => decision,
        }
    }

    pub fn execution(&self) -> Option<&ExecutionResult> {
        match self {
            FastPathOutcome::Skipped { .. } => None,
            FastPathOutcome::Completed { execution, .. } | FastPathOutcome::Failed { execution, .. } => {
                Some(execution)
            }
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, FastPathOutcome::Completed { .. })
    }
}

/// What learning from one trajectory produced.
#[derive(Debug, Clone)]
pub struct LearnOutcome {
    pub trajectory_id: TrajectoryId,
    /// `None` when the trajectory failed and synthesis was not attempted.
    pub synthesis: Option<SynthesisResult>,
    pub skill: Option<Skill>,
}

/// The learning loop in one place: route, replay, report, learn.
///
/// Holds one injected store; every piece that needs it shares the same `Arc`.
pub struct Accelerator {
    store: Arc<KnowledgeStore>,
    router: SmartRouter,
    synthesizer: SkillSynthesizer,
    executor: SkillExecutor,
    events: EventBus,
}

impl Accelerator {
    pub fn new(store: Arc<KnowledgeStore>, config: &ReflexConfig, provider: Option<Arc<dyn LlmProvider>>) -> Self {
        let extractor = ParameterExtractor::from_config(config, provider.clone());
        let router = SmartRouter::from_config(store.clone(), config, extractor);
        Self {
            router,
            synthesizer: SkillSynthesizer::from_config(config, provider),
            executor: SkillExecutor::from_config(&config.executor),
            events: EventBus::default(),
            store,
        }
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: SkillSynthesizer) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn store(&self) -> &Arc<KnowledgeStore> {
        &self.store
    }

    pub fn router(&self) -> &SmartRouter {
        &self.router
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub async fn route(&self, task: &str, url: &str) -> RouteDecision {
        let decision = self.router.route(task, url).await;
        self.events.publish(Event::RouteDecided {
            task: task.to_string(),
            fast: decision.is_fast(),
            confidence: decision.confidence,
            skill_id: decision.skill.as_ref().map(|s| s.id.clone()),
            reason: decision.reason.to_string(),
        });
        decision
    }

    /// Route and, on the fast path, replay the skill and report its outcome.
    ///
    /// Only storage errors are returned as `Err`; every other failure is a
    /// `Skipped` or `Failed` outcome.
    pub async fn run_fast_path(&self, task: &str, url: &str, page: &dyn Page) -> Result<FastPathOutcome> {
        let decision = self.route(task, url).await;
        let (Some(skill), Some(params)) = (&decision.skill, &decision.params) else {
            return Ok(FastPathOutcome::Skipped { decision });
        };

        let execution = self.executor.execute_skill(page, skill, params, None).await;
        self.events.publish(Event::SkillExecuted {
            skill_id: skill.id.clone(),
            success: execution.success,
            duration_ms: execution.duration_ms,
            error: execution.error.as_ref().map(ToString::to_string),
        });
        if let Some(error) = &execution.error {
            warn!(skill = %skill.name, error = %error, "fast path failed");
        }

        let update = self.report_outcome(&skill.id, execution.success)?;
        let confidence = update.skill.confidence;
        Ok(if execution.success {
            FastPathOutcome::Completed {
                decision,
                execution,
                confidence,
            }
        } else {
            FastPathOutcome::Failed {
                decision,
                execution,
                confidence,
            }
        })
    }

    /// Feed a replay outcome back into the skill's confidence. Callers that
    /// execute skills themselves must call this after every run.
    pub fn report_outcome(&self, skill_id: &str, success: bool) -> Result<ConfidenceUpdate> {
        let update = self.store.update_skill_confidence(skill_id, success)?;
        self.events.publish(Event::ConfidenceUpdated {
            skill_id: skill_id.to_string(),
            before: update.before,
            after: update.skill.confidence,
        });
        if update.newly_pruned {
            self.events.publish(Event::SkillPruned {
                skill_id: skill_id.to_string(),
                confidence: update.skill.confidence,
            });
        }
        Ok(update)
    }

    /// Persist a finished trajectory and, when it succeeded, synthesize a skill from it.
    pub async fn learn(&self, trajectory: &RecordedTrajectory, session_id: SessionId) -> Result<LearnOutcome> {
        let trajectory_id = self.store.save_recorded(trajectory, session_id)?;
        self.events.publish(Event::TrajectorySaved {
            trajectory_id: trajectory_id.clone(),
            domain: reflex_core::domain_of(&trajectory.start_url),
            success: trajectory.success,
        });
        if !trajectory.success {
            return Ok(LearnOutcome {
                trajectory_id,
                synthesis: None,
                skill: None,
            });
        }

        let outcome = self
            .synthesizer
            .synthesize_and_save(&self.store, trajectory, Some(trajectory_id.as_str()))
            .await?;
        match &outcome.skill {
            Some(skill) => {
                info!(skill = %skill.name, domain = %skill.domain, version = skill.version, "skill learned");
                self.events.publish(Event::SkillLearned {
                    skill_id: skill.id.clone(),
                    name: skill.name.clone(),
                    domain: skill.domain.clone(),
                    version: skill.version,
                });
            }
            None => self.events.publish(Event::SynthesisRejected {
                trajectory_id: trajectory_id.clone(),
                attempts: outcome.result.attempts,
                reason: outcome.result.error.clone().unwrap_or_default(),
            }),
        }
        Ok(LearnOutcome {
            trajectory_id,
            synthesis: Some(outcome.result),
            skill: outcome.skill,
        })
    }
}

//! The fast/normal decision for a new task.
//!
//! ```text
//! START → TRAJECTORY_LOOKUP → SKILL_LOOKUP → PARAMETER_EXTRACTION → FAST | NORMAL
//! ```
//!
//! The router only decides and binds. It never runs a skill, and every
//! failure along the way ends in NORMAL: an outage in the learning layer may
//! cost acceleration, never the task.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use reflex_config::{ReflexConfig, RouterConfig};
use reflex_core::{Result, Skill, domain_of};
use reflex_skills::ParameterExtractor;
use reflex_store::{KnowledgeStore, SkillMatch, TrajectoryMatch};

/// The read side of the knowledge store the router depends on.
pub trait SkillLookup: Send + Sync {
    fn search(&self, task: &str, url: &str) -> Result<TrajectoryMatch>;

    fn search_skills(&self, task: &str, domain: &str) -> Result<Vec<SkillMatch>>;
}

impl SkillLookup for KnowledgeStore {
    fn search(&self, task: &str, url: &str) -> Result<TrajectoryMatch> {
        KnowledgeStore::search(self, task, url)
    }

    fn search_skills(&self, task: &str, domain: &str) -> Result<Vec<SkillMatch>> {
        KnowledgeStore::search_skills(self, task, domain)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutePath {
    Fast,
    Normal,
}

/// Why the router chose its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteReason {
    NoDomain,
    StoreError,
    NoCandidates,
    BelowThreshold,
    ExtractionFailed,
    Matched,
}

impl RouteReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteReason::NoDomain => "no_domain",
            RouteReason::StoreError => "store_error",
            RouteReason::NoCandidates => "no_candidates",
            RouteReason::BelowThreshold => "below_threshold",
            RouteReason::ExtractionFailed => "extraction_failed",
            RouteReason::Matched => "matched",
        }
    }
}

impl std::fmt::Display for RouteReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteDecision {
    pub path: RoutePath,
    /// Blended score of the best candidate considered, 0 when there was none.
    pub confidence: f64,
    pub skill: Option<Skill>,
    pub params: Option<Map<String, Value>>,
    pub reason: RouteReason,
    /// Best historical trajectory for the task. Informational only.
    pub trajectory_match: Option<TrajectoryMatch>,
}

impl RouteDecision {
    fn normal(reason: RouteReason, confidence: f64, trajectory_match: Option<TrajectoryMatch>) -> Self {
        Self {
            path: RoutePath::Normal,
            confidence,
            skill: None,
            params: None,
            reason,
            trajectory_match,
        }
    }

    pub fn is_fast(&self) -> bool {
        self.path == RoutePath::Fast
    }
}

pub struct SmartRouter {
    lookup: Arc<dyn SkillLookup>,
    extractor: ParameterExtractor,
    config: RouterConfig,
}

impl SmartRouter {
    pub fn new(lookup: Arc<dyn SkillLookup>, extractor: ParameterExtractor, config: RouterConfig) -> Self {
        Self {
            lookup,
            extractor,
            config,
        }
    }

    pub fn from_config(lookup: Arc<dyn SkillLookup>, config: &ReflexConfig, extractor: ParameterExtractor) -> Self {
        Self::new(lookup, extractor, config.router.clone())
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub async fn route(&self, task: &str, url: &str) -> RouteDecision {
        let decision = self.decide(task, url).await;
        info!(
            task = %task,
            path = ?decision.path,
            reason = %decision.reason,
            confidence = decision.confidence,
            skill = decision.skill.as_ref().map(|s| s.name.as_str()).unwrap_or("-"),
            "route decided"
        );
        decision
    }

    async fn decide(&self, task: &str, url: &str) -> RouteDecision {
        let Some(domain) = domain_of(url) else {
            return RouteDecision::normal(RouteReason::NoDomain, 0.0, None);
        };

        let (trajectory_match, candidates) = match self.lookup(task, url, &domain).await {
            Ok(found) => found,
            Err(reason) => {
                warn!(domain = %domain, error = %reason, "skill lookup failed, routing normally");
                return RouteDecision::normal(RouteReason::StoreError, 0.0, None);
            }
        };

        let Some(best) = candidates.first() else {
            return RouteDecision::normal(RouteReason::NoCandidates, 0.0, Some(trajectory_match));
        };
        if best.score <= self.config.skill_threshold {
            debug!(
                skill = %best.skill.name,
                score = best.score,
                threshold = self.config.skill_threshold,
                "best candidate below threshold"
            );
            return RouteDecision::normal(RouteReason::BelowThreshold, best.score, Some(trajectory_match));
        }

        let extraction = self.extractor.extract(task, &best.skill).await;
        if !extraction.success {
            debug!(
                skill = %best.skill.name,
                error = extraction.error.as_deref().unwrap_or_default(),
                "parameter extraction failed"
            );
            return RouteDecision::normal(RouteReason::ExtractionFailed, best.score, Some(trajectory_match));
        }

        RouteDecision {
            path: RoutePath::Fast,
            confidence: best.score,
            skill: Some(best.skill.clone()),
            params: Some(extraction.params),
            reason: RouteReason::Matched,
            trajectory_match: Some(trajectory_match),
        }
    }

    /// Both store lookups, on the blocking pool and under the lookup budget.
    async fn lookup(
        &self,
        task: &str,
        url: &str,
        domain: &str,
    ) -> std::result::Result<(TrajectoryMatch, Vec<SkillMatch>), String> {
        let lookup = Arc::clone(&self.lookup);
        let (task, url, domain) = (task.to_string(), url.to_string(), domain.to_string());
        let max = self.config.max_candidates;
        let job = tokio::task::spawn_blocking(move || -> Result<_> {
            let trajectory_match = lookup.search(&task, &url)?;
            let mut candidates = lookup.search_skills(&task, &domain)?;
            candidates.truncate(max);
            Ok((trajectory_match, candidates))
        });

        let budget = Duration::from_millis(self.config.lookup_timeout_ms);
        match tokio::time::timeout(budget, job).await {
            Ok(Ok(Ok(found))) => Ok(found),
            Ok(Ok(Err(e))) => Err(e.to_string()),
            Ok(Err(join)) => Err(format!("lookup task failed: {join}")),
            Err(_) => Err(format!("lookup exceeded {}ms", self.config.lookup_timeout_ms)),
        }
    }
}

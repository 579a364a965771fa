use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Store-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub trajectories: u64,
    pub successful_trajectories: u64,
    /// All skill rows, including pruned and superseded revisions.
    pub skills: u64,
    /// Distinct domains across trajectories and skills.
    pub domains: u64,
    /// Latest revisions at or above the reliable threshold.
    pub reliable_skills: u64,
}

/// Skill breakdown. Everything except `total`, `superseded` and the outcome
/// totals counts latest revisions only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillStats {
    pub total: u64,
    pub active: u64,
    pub pruned: u64,
    pub reliable: u64,
    pub superseded: u64,
    pub average_confidence: f64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub by_domain: BTreeMap<String, u64>,
}

impl SkillStats {
    /// Share of replays that succeeded, if any ran.
    pub fn success_rate(&self) -> Option<f64> {
        let runs = self.total_successes + self.total_failures;
        (runs > 0).then(|| self.total_successes as f64 / runs as f64)
    }
}

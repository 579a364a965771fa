use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use reflex_config::{MatchingConfig, ReflexConfig};
use reflex_core::types::{SessionId, SkillId, TrajectoryId};
use reflex_core::{
    RecordedAction, RecordedTrajectory, ReflexError, Result, Skill, SkillParameter, Trajectory,
    domain_of, normalize_task, normalize_url,
};

use crate::confidence::ConfidenceModel;
use crate::similarity::{description_coverage, task_similarity};
use crate::stats::{SkillStats, StoreStats};

/// Upper bound on same-domain trajectories scored per search.
const TRAJECTORY_SCAN_LIMIT: i64 = 1_000;

const SKILL_COLUMNS: &str = "id, name, description, code, domain, parameters, version, confidence, \
     success_count, failure_count, source_trajectory_id, superseded_by, created_at, updated_at";

const TRAJECTORY_COLUMNS: &str = "id, session_id, task, url, domain, actions, success, result, created_at";

/// Result of a trajectory search. A miss is `matched = false, confidence = 0.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryMatch {
    pub matched: bool,
    pub confidence: f64,
    pub trajectory: Option<Trajectory>,
}

impl TrajectoryMatch {
    pub fn miss() -> Self {
        Self {
            matched: false,
            confidence: 0.0,
            trajectory: None,
        }
    }
}

/// A skill candidate for a task, ranked by `score`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillMatch {
    pub skill: Skill,
    /// Description coverage of the task, in `[0, 1]`.
    pub similarity: f64,
    /// `similarity × (0.5 + 0.5 × confidence)`.
    pub score: f64,
}

/// Input to [`KnowledgeStore::save_skill`].
#[derive(Debug, Clone)]
pub struct NewSkill {
    pub name: String,
    pub description: String,
    pub code: String,
    pub domain: String,
    pub parameters: Vec<SkillParameter>,
    pub source_trajectory_id: Option<TrajectoryId>,
}

/// The outcome of one confidence update.
#[derive(Debug, Clone)]
pub struct ConfidenceUpdate {
    pub skill: Skill,
    pub before: f64,
    /// The update moved the skill below the prune floor.
    pub newly_pruned: bool,
}

/// One row of the replay audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillOutcome {
    pub skill_id: SkillId,
    pub success: bool,
    pub confidence_before: f64,
    pub confidence_after: f64,
    pub created_at: DateTime<Utc>,
}

/// Durable repository of trajectories and skills.
///
/// All access goes through one connection behind a mutex, and every
/// multi-statement mutation runs in a transaction while holding it, so
/// concurrent updates to the same skill are serialized.
pub struct KnowledgeStore {
    db: Arc<Mutex<Connection>>,
    matching: MatchingConfig,
    confidence: ConfidenceModel,
}

fn storage(e: rusqlite::Error) -> ReflexError {
    ReflexError::Storage(e.to_string())
}

fn conversion_failure(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion_failure(idx, e))
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| conversion_failure(idx, e))
}

fn skill_from_row(row: &Row<'_>) -> rusqlite::Result<Skill> {
    Ok(Skill {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        code: row.get(3)?,
        domain: row.get(4)?,
        parameters: json_column(row, 5)?,
        version: row.get::<_, i64>(6)? as u32,
        confidence: row.get(7)?,
        success_count: row.get::<_, i64>(8)? as u64,
        failure_count: row.get::<_, i64>(9)? as u64,
        source_trajectory_id: row.get(10)?,
        superseded_by: row.get(11)?,
        created_at: ts_column(row, 12)?,
        updated_at: ts_column(row, 13)?,
    })
}

fn trajectory_from_row(row: &Row<'_>) -> rusqlite::Result<Trajectory> {
    let session: String = row.get(1)?;
    Ok(Trajectory {
        id: row.get(0)?,
        session_id: Uuid::parse_str(&session).map_err(|e| conversion_failure(1, e))?,
        task: row.get(2)?,
        url: row.get(3)?,
        domain: row.get(4)?,
        actions: json_column(row, 5)?,
        success: row.get::<_, i64>(6)? != 0,
        result: row.get(7)?,
        created_at: ts_column(row, 8)?,
    })
}

fn load_skill(conn: &Connection, id: &str) -> Result<Option<Skill>> {
    conn.query_row(
        &format!("SELECT {SKILL_COLUMNS} FROM skills WHERE id = ?1"),
        params![id],
        skill_from_row,
    )
    .optional()
    .map_err(storage)
}

impl KnowledgeStore {
    /// Open or create the knowledge database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        info!(?path, "opening knowledge store");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path).map_err(storage)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;")
            .map_err(storage)?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS trajectories (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                task TEXT NOT NULL,
                task_norm TEXT NOT NULL,
                url TEXT NOT NULL,
                url_norm TEXT NOT NULL,
                domain TEXT,
                actions TEXT NOT NULL DEFAULT '[]',
                success INTEGER NOT NULL,
                result TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS skills (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                code TEXT NOT NULL,
                domain TEXT NOT NULL,
                parameters TEXT NOT NULL DEFAULT '[]',
                version INTEGER NOT NULL DEFAULT 1,
                confidence REAL NOT NULL,
                success_count INTEGER NOT NULL DEFAULT 0,
                failure_count INTEGER NOT NULL DEFAULT 0,
                source_trajectory_id TEXT,
                superseded_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE(domain, name, version)
            );

            CREATE TABLE IF NOT EXISTS skill_outcomes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                skill_id TEXT NOT NULL REFERENCES skills(id),
                success INTEGER NOT NULL,
                confidence_before REAL NOT NULL,
                confidence_after REAL NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_trajectories_domain ON trajectories(domain);
            CREATE INDEX IF NOT EXISTS idx_trajectories_exact ON trajectories(task_norm, url_norm);
            CREATE INDEX IF NOT EXISTS idx_skills_domain ON skills(domain);
            CREATE INDEX IF NOT EXISTS idx_skill_outcomes_skill ON skill_outcomes(skill_id);
            ",
        )
        .map_err(storage)?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            matching: MatchingConfig::default(),
            confidence: ConfidenceModel::default(),
        })
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    /// Use the matching and confidence settings from `config`.
    pub fn with_config(mut self, config: &ReflexConfig) -> Self {
        self.matching = config.matching.clone();
        self.confidence = ConfidenceModel::from_config(&config.confidence);
        self
    }

    pub fn confidence_model(&self) -> &ConfidenceModel {
        &self.confidence
    }

    // ── Trajectories ───────────────────────────────────────────

    /// Append a trajectory under the nil session. Never deduplicates.
    pub fn save(
        &self,
        task: &str,
        url: &str,
        actions: &[RecordedAction],
        success: bool,
        result: Option<&str>,
    ) -> Result<TrajectoryId> {
        self.save_with_session(Uuid::nil(), task, url, actions, success, result)
    }

    /// Append a trajectory recorded in `session_id`.
    pub fn save_with_session(
        &self,
        session_id: SessionId,
        task: &str,
        url: &str,
        actions: &[RecordedAction],
        success: bool,
        result: Option<&str>,
    ) -> Result<TrajectoryId> {
        let id = Uuid::new_v4().to_string();
        let domain = domain_of(url);
        let actions_json = serde_json::to_string(actions)?;
        let now = Utc::now().to_rfc3339();

        let db = self.db.lock();
        db.execute(
            "INSERT INTO trajectories
                (id, session_id, task, task_norm, url, url_norm, domain, actions, success, result, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                id,
                session_id.to_string(),
                task,
                normalize_task(task),
                url,
                normalize_url(url),
                domain,
                actions_json,
                success as i64,
                result,
                now,
            ],
        )
        .map_err(storage)?;

        info!(trajectory = %id, domain = ?domain, success, actions = actions.len(), "trajectory saved");
        Ok(id)
    }

    /// Persist a finished [`RecordedTrajectory`], keyed by its start URL.
    pub fn save_recorded(&self, trajectory: &RecordedTrajectory, session_id: SessionId) -> Result<TrajectoryId> {
        self.save_with_session(
            session_id,
            &trajectory.task,
            &trajectory.start_url,
            &trajectory.actions,
            trajectory.success,
            None,
        )
    }

    /// Best historical trajectory for `(task, url)`.
    ///
    /// Only successful trajectories count. An exact normalized match scores
    /// 1.0; otherwise only trajectories on the same domain are scored, capped
    /// at the partial-match ceiling.
    pub fn search(&self, task: &str, url: &str) -> Result<TrajectoryMatch> {
        let db = self.db.lock();

        let exact = db
            .query_row(
                &format!(
                    "SELECT {TRAJECTORY_COLUMNS} FROM trajectories
                     WHERE success = 1 AND task_norm = ?1 AND url_norm = ?2
                     ORDER BY created_at DESC LIMIT 1"
                ),
                params![normalize_task(task), normalize_url(url)],
                trajectory_from_row,
            )
            .optional()
            .map_err(storage)?;
        if let Some(trajectory) = exact {
            debug!(trajectory = %trajectory.id, "exact trajectory match");
            return Ok(TrajectoryMatch {
                matched: true,
                confidence: 1.0,
                trajectory: Some(trajectory),
            });
        }

        let Some(domain) = domain_of(url) else {
            return Ok(TrajectoryMatch::miss());
        };

        let mut stmt = db
            .prepare(&format!(
                "SELECT {TRAJECTORY_COLUMNS} FROM trajectories
                 WHERE success = 1 AND domain = ?1
                 ORDER BY created_at DESC LIMIT ?2"
            ))
            .map_err(storage)?;
        let candidates = stmt
            .query_map(params![domain, TRAJECTORY_SCAN_LIMIT], trajectory_from_row)
            .map_err(storage)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage)?;

        let best = candidates
            .into_iter()
            .map(|t| (task_similarity(task, &t.task), t))
            .filter(|(sim, _)| *sim > 0.0)
            .max_by(|a, b| a.0.total_cmp(&b.0));

        Ok(match best {
            Some((similarity, trajectory)) => {
                let confidence = self.matching.partial_match_ceiling * similarity;
                debug!(trajectory = %trajectory.id, similarity, confidence, "partial trajectory match");
                TrajectoryMatch {
                    matched: confidence >= self.matching.trajectory_match_threshold,
                    confidence,
                    trajectory: Some(trajectory),
                }
            }
            None => TrajectoryMatch::miss(),
        })
    }

    pub fn get_trajectory(&self, id: &str) -> Result<Option<Trajectory>> {
        let db = self.db.lock();
        db.query_row(
            &format!("SELECT {TRAJECTORY_COLUMNS} FROM trajectories WHERE id = ?1"),
            params![id],
            trajectory_from_row,
        )
        .optional()
        .map_err(storage)
    }

    /// Most recent trajectories, newest first.
    pub fn recent_trajectories(&self, limit: usize) -> Result<Vec<Trajectory>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(&format!(
                "SELECT {TRAJECTORY_COLUMNS} FROM trajectories ORDER BY created_at DESC, rowid DESC LIMIT ?1"
            ))
            .map_err(storage)?;
        stmt.query_map(params![limit as i64], trajectory_from_row)
            .map_err(storage)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage)
    }

    // ── Skills ─────────────────────────────────────────────────

    /// Persist a skill. A name already used in the domain creates the next
    /// revision and marks the previous one superseded.
    pub fn save_skill(&self, new: NewSkill) -> Result<Skill> {
        let domain = domain_of(&new.domain)
            .ok_or_else(|| ReflexError::Other(anyhow::anyhow!("skill '{}' has no domain", new.name)))?;
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let parameters = serde_json::to_string(&new.parameters)?;

        let mut db = self.db.lock();
        let tx = db.transaction().map_err(storage)?;

        let previous: Option<(String, i64)> = tx
            .query_row(
                "SELECT id, version FROM skills WHERE domain = ?1 AND name = ?2
                 ORDER BY version DESC LIMIT 1",
                params![domain, new.name],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(storage)?;
        let version = previous.as_ref().map(|(_, v)| v + 1).unwrap_or(1);

        tx.execute(
            "INSERT INTO skills
                (id, name, description, code, domain, parameters, version, confidence,
                 success_count, failure_count, source_trajectory_id, superseded_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 0, ?9, NULL, ?10, ?10)",
            params![
                id,
                new.name,
                new.description,
                new.code,
                domain,
                parameters,
                version,
                self.confidence.initial,
                new.source_trajectory_id,
                now,
            ],
        )
        .map_err(storage)?;

        if let Some((previous_id, _)) = &previous {
            tx.execute(
                "UPDATE skills SET superseded_by = ?2, updated_at = ?3 WHERE id = ?1",
                params![previous_id, id, now],
            )
            .map_err(storage)?;
        }

        let skill = load_skill(&tx, &id)?.ok_or_else(|| ReflexError::SkillNotFound(id.clone()))?;
        tx.commit().map_err(storage)?;

        match previous {
            Some((previous_id, _)) => info!(
                skill = %skill.name, domain = %skill.domain, version, supersedes = %previous_id,
                "skill revision saved"
            ),
            None => info!(skill = %skill.name, domain = %skill.domain, "skill saved"),
        }
        Ok(skill)
    }

    pub fn get_skill_by_id(&self, id: &str) -> Result<Option<Skill>> {
        let db = self.db.lock();
        load_skill(&db, id)
    }

    /// Candidate skills for `task` within `domain`, best first.
    ///
    /// Only the latest revision of each name is considered, and skills below
    /// the prune floor are excluded. Skills whose description shares nothing
    /// with the task are dropped.
    pub fn search_skills(&self, task: &str, domain: &str) -> Result<Vec<SkillMatch>> {
        let Some(domain) = domain_of(domain) else {
            return Ok(vec![]);
        };

        let skills = {
            let db = self.db.lock();
            let mut stmt = db
                .prepare(&format!(
                    "SELECT {SKILL_COLUMNS} FROM skills
                     WHERE domain = ?1 AND superseded_by IS NULL AND confidence >= ?2"
                ))
                .map_err(storage)?;
            stmt.query_map(params![domain, self.confidence.prune_floor], skill_from_row)
                .map_err(storage)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage)?
        };

        let mut matches: Vec<SkillMatch> = skills
            .into_iter()
            .filter_map(|skill| {
                let similarity = description_coverage(task, &skill.description);
                if similarity <= 0.0 {
                    return None;
                }
                let score = similarity * (0.5 + 0.5 * skill.confidence);
                Some(SkillMatch {
                    skill,
                    similarity,
                    score,
                })
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(b.skill.confidence.total_cmp(&a.skill.confidence))
                .then(b.skill.created_at.cmp(&a.skill.created_at))
        });

        debug!(domain = %domain, candidates = matches.len(), "skill search");
        Ok(matches)
    }

    /// Latest revisions, optionally restricted to one domain.
    pub fn list_skills(&self, domain: Option<&str>, include_pruned: bool) -> Result<Vec<Skill>> {
        let domain = domain.and_then(domain_of);
        let floor = if include_pruned { -1.0 } else { self.confidence.prune_floor };
        let db = self.db.lock();
        let mut stmt = db
            .prepare(&format!(
                "SELECT {SKILL_COLUMNS} FROM skills
                 WHERE superseded_by IS NULL AND confidence >= ?1 AND (?2 IS NULL OR domain = ?2)
                 ORDER BY domain, name"
            ))
            .map_err(storage)?;
        stmt.query_map(params![floor, domain], skill_from_row)
            .map_err(storage)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage)
    }

    /// Every revision of `name` in `domain`, oldest first.
    pub fn skill_revisions(&self, domain: &str, name: &str) -> Result<Vec<Skill>> {
        let domain = domain_of(domain).unwrap_or_default();
        let db = self.db.lock();
        let mut stmt = db
            .prepare(&format!(
                "SELECT {SKILL_COLUMNS} FROM skills WHERE domain = ?1 AND name = ?2 ORDER BY version"
            ))
            .map_err(storage)?;
        stmt.query_map(params![domain, name], skill_from_row)
            .map_err(storage)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(storage)
    }

    /// Record one replay outcome and move the skill's confidence.
    ///
    /// Read, update and audit row happen in one transaction under the store
    /// lock, so concurrent reports for the same skill are never lost.
    pub fn update_skill_confidence(&self, id: &str, success: bool) -> Result<ConfidenceUpdate> {
        let now = Utc::now().to_rfc3339();
        let mut db = self.db.lock();
        let tx = db.transaction().map_err(storage)?;

        let before: f64 = tx
            .query_row("SELECT confidence FROM skills WHERE id = ?1", params![id], |row| row.get(0))
            .optional()
            .map_err(storage)?
            .ok_or_else(|| ReflexError::SkillNotFound(id.to_string()))?;
        let after = self.confidence.apply(before, success);

        let counter = if success { "success_count" } else { "failure_count" };
        tx.execute(
            &format!(
                "UPDATE skills SET confidence = ?2, {counter} = {counter} + 1, updated_at = ?3 WHERE id = ?1"
            ),
            params![id, after, now],
        )
        .map_err(storage)?;
        tx.execute(
            "INSERT INTO skill_outcomes (skill_id, success, confidence_before, confidence_after, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, success as i64, before, after, now],
        )
        .map_err(storage)?;

        let skill = load_skill(&tx, id)?.ok_or_else(|| ReflexError::SkillNotFound(id.to_string()))?;
        tx.commit().map_err(storage)?;

        let newly_pruned = !self.confidence.is_pruned(before) && self.confidence.is_pruned(after);
        if newly_pruned {
            warn!(skill = %skill.name, domain = %skill.domain, confidence = after, "skill pruned from candidates");
        } else {
            debug!(skill = %skill.name, success, before, after, "skill confidence updated");
        }

        Ok(ConfidenceUpdate {
            skill,
            before,
            newly_pruned,
        })
    }

    /// Replay outcomes of a skill, newest first.
    pub fn skill_outcomes(&self, id: &str, limit: usize) -> Result<Vec<SkillOutcome>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT skill_id, success, confidence_before, confidence_after, created_at
                 FROM skill_outcomes WHERE skill_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(storage)?;
        stmt.query_map(params![id, limit as i64], |row| {
            Ok(SkillOutcome {
                skill_id: row.get(0)?,
                success: row.get::<_, i64>(1)? != 0,
                confidence_before: row.get(2)?,
                confidence_after: row.get(3)?,
                created_at: ts_column(row, 4)?,
            })
        })
        .map_err(storage)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(storage)
    }

    // ── Stats ──────────────────────────────────────────────────

    pub fn get_stats(&self) -> Result<StoreStats> {
        let db = self.db.lock();
        let count = |sql: &str, threshold: Option<f64>| -> Result<u64> {
            let n: i64 = match threshold {
                Some(t) => db.query_row(sql, params![t], |row| row.get(0)),
                None => db.query_row(sql, [], |row| row.get(0)),
            }
            .map_err(storage)?;
            Ok(n as u64)
        };

        Ok(StoreStats {
            trajectories: count("SELECT COUNT(*) FROM trajectories", None)?,
            successful_trajectories: count("SELECT COUNT(*) FROM trajectories WHERE success = 1", None)?,
            skills: count("SELECT COUNT(*) FROM skills", None)?,
            domains: count(
                "SELECT COUNT(*) FROM (
                    SELECT domain FROM skills
                    UNION SELECT domain FROM trajectories WHERE domain IS NOT NULL
                 )",
                None,
            )?,
            reliable_skills: count(
                "SELECT COUNT(*) FROM skills WHERE superseded_by IS NULL AND confidence >= ?1",
                Some(self.confidence.reliable_threshold),
            )?,
        })
    }

    pub fn get_skill_stats(&self) -> Result<SkillStats> {
        let all = {
            let db = self.db.lock();
            let mut stmt = db
                .prepare(&format!("SELECT {SKILL_COLUMNS} FROM skills"))
                .map_err(storage)?;
            stmt.query_map([], skill_from_row)
                .map_err(storage)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(storage)?
        };

        let mut stats = SkillStats {
            total: all.len() as u64,
            ..Default::default()
        };
        let mut by_domain: BTreeMap<String, u64> = BTreeMap::new();
        let mut confidence_sum = 0.0;
        let mut latest = 0u64;

        for skill in &all {
            stats.total_successes += skill.success_count;
            stats.total_failures += skill.failure_count;
            if !skill.is_latest() {
                stats.superseded += 1;
                continue;
            }
            latest += 1;
            confidence_sum += skill.confidence;
            *by_domain.entry(skill.domain.clone()).or_default() += 1;
            if self.confidence.is_pruned(skill.confidence) {
                stats.pruned += 1;
            } else {
                stats.active += 1;
            }
            if self.confidence.is_reliable(skill.confidence) {
                stats.reliable += 1;
            }
        }

        stats.average_confidence = if latest == 0 { 0.0 } else { confidence_sum / latest as f64 };
        stats.by_domain = by_domain;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> KnowledgeStore {
        KnowledgeStore::open_in_memory().unwrap()
    }

    fn new_skill(name: &str, description: &str, domain: &str) -> NewSkill {
        NewSkill {
            name: name.into(),
            description: description.into(),
            code: "{}".into(),
            domain: domain.into(),
            parameters: vec![SkillParameter::string("query")],
            source_trajectory_id: None,
        }
    }

    #[test]
    fn save_never_deduplicates() {
        let s = store();
        let a = s.save("task", "https://a.com", &[], true, None).unwrap();
        let b = s.save("task", "https://a.com", &[], true, None).unwrap();
        assert_ne!(a, b);
        assert_eq!(s.get_stats().unwrap().trajectories, 2);
    }

    #[test]
    fn failed_trajectories_never_match() {
        let s = store();
        s.save("Search for rust", "https://a.com", &[], false, None).unwrap();
        let m = s.search("Search for rust", "https://a.com").unwrap();
        assert!(!m.matched);
        assert_eq!(m.confidence, 0.0);
    }

    #[test]
    fn skill_domain_is_normalised() {
        let s = store();
        let skill = s.save_skill(new_skill("f", "Do {query}", "https://WWW.Example.com/x")).unwrap();
        assert_eq!(skill.domain, "example.com");
        assert!(s.save_skill(new_skill("g", "Do {query}", "")).is_err());
    }

    #[test]
    fn confidence_update_unknown_skill() {
        let s = store();
        let err = s.update_skill_confidence("missing", true).unwrap_err();
        assert!(matches!(err, ReflexError::SkillNotFound(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn outcomes_are_audited() {
        let s = store();
        let skill = s.save_skill(new_skill("f", "Do {query}", "a.com")).unwrap();
        s.update_skill_confidence(&skill.id, true).unwrap();
        s.update_skill_confidence(&skill.id, false).unwrap();
        let outcomes = s.skill_outcomes(&skill.id, 10).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(!outcomes[0].success);
        assert!((outcomes[1].confidence_after - 0.55).abs() < 1e-9);
        assert!((outcomes[0].confidence_before - 0.55).abs() < 1e-9);
    }
}

use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use reflex_config::{ConfigLoader, ReflexConfig};
use reflex_core::ReflexError;
use reflex_runtime::Accelerator;
use reflex_store::KnowledgeStore;

mod learn;
mod route;
mod skills;
mod stats;

/// Reflex: learn reusable browser skills from agent trajectories
#[derive(Parser)]
#[command(name = "reflex", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to reflex.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Show store and skill counters
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List learned skills (latest revisions)
    Skills {
        /// Only skills for this domain
        #[arg(short, long)]
        domain: Option<String>,
        /// Include pruned skills
        #[arg(long)]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one skill with its revisions and replay history
    Skill {
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one trajectory with its recorded actions
    Trajectory {
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show recent trajectories
    Trajectories {
        /// Number of trajectories to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Decide fast or normal path for a task without running anything
    Route {
        task: String,
        url: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Persist a recorded trajectory (JSON) and synthesize a skill from it
    Learn {
        file: PathBuf,
        /// Session the trajectory belongs to (a new one if omitted)
        #[arg(short, long)]
        session: Option<Uuid>,
    },
    /// Report the outcome of a skill replay
    Outcome {
        skill_id: String,
        #[arg(long, conflicts_with = "failure", required_unless_present = "failure")]
        success: bool,
        #[arg(long)]
        failure: bool,
    },
    /// Show the effective configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Resolve the log level: --verbose > --quiet > --log-level > config.
fn resolve_log_level<'a>(verbose: bool, quiet: bool, flag: Option<&'a str>, configured: &'a str) -> &'a str {
    if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        flag.unwrap_or(configured)
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        "json" => builder.json().with_target(true).init(),
        "compact" => builder.compact().with_target(false).init(),
        _ => builder.with_target(false).init(),
    }
}

impl Cli {
    pub async fn run(self) -> reflex_core::Result<()> {
        // Load config first so we can use it for the log format
        let loader = ConfigLoader::load(self.config.as_deref())?;
        let config = loader.get();

        let level = resolve_log_level(self.verbose, self.quiet, self.log_level.as_deref(), &config.logging.level);
        init_tracing(level, &config.logging.format);

        match self.command {
            Commands::Stats { json } => stats::cmd_stats(&config, json),
            Commands::Skills { domain, all, json } => skills::cmd_skills(&config, domain.as_deref(), all, json),
            Commands::Skill { id, json } => skills::cmd_skill(&config, &id, json),
            Commands::Trajectory { id, json } => stats::cmd_trajectory(&config, &id, json),
            Commands::Trajectories { limit, json } => stats::cmd_trajectories(&config, limit, json),
            Commands::Route { task, url, json } => route::cmd_route(&config, &task, &url, json).await,
            Commands::Learn { file, session } => learn::cmd_learn(&config, &file, session).await,
            Commands::Outcome { skill_id, success, .. } => skills::cmd_outcome(&config, &skill_id, success),
            Commands::Config { json } => cmd_config(&config, json),
        }
    }
}

fn cmd_config(config: &ReflexConfig, json: bool) -> reflex_core::Result<()> {
    let rendered = if json {
        serde_json::to_string_pretty(config)?
    } else {
        toml::to_string_pretty(config).map_err(|e| ReflexError::Config(e.to_string()))?
    };
    println!("{rendered}");
    Ok(())
}

fn open_store(config: &ReflexConfig) -> reflex_core::Result<Arc<KnowledgeStore>> {
    let store = KnowledgeStore::open(&config.store.db_path)?.with_config(config);
    Ok(Arc::new(store))
}

/// The full learning loop over the configured store and completion service.
fn accelerator(config: &ReflexConfig) -> reflex_core::Result<Accelerator> {
    let store = open_store(config)?;
    let provider = reflex_llm::provider_from_config(&config.llm);
    if provider.is_none() {
        tracing::debug!("no completion service, using template synthesis and pattern extraction only");
    }
    Ok(Accelerator::new(store, config, provider))
}

fn confidence_label(store: &KnowledgeStore, confidence: f64) -> String {
    let model = store.confidence_model();
    let text = format!("{confidence:.2}");
    if model.is_pruned(confidence) {
        style(text).red().to_string()
    } else if model.is_reliable(confidence) {
        style(text).green().to_string()
    } else {
        style(text).yellow().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflex_core::{RecordedAction, TrajectoryRecorder};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("reflex").chain(args.iter().copied())).unwrap()
    }

    fn temp_config(dir: &tempfile::TempDir) -> ReflexConfig {
        let mut config = ReflexConfig::default();
        config.store.db_path = dir.path().join("knowledge.db");
        config.llm.api_key = None;
        config
    }

    #[test]
    fn log_level_precedence() {
        assert_eq!(resolve_log_level(true, false, Some("warn"), "info"), "debug");
        assert_eq!(resolve_log_level(false, true, Some("warn"), "info"), "error");
        assert_eq!(resolve_log_level(false, false, Some("warn"), "info"), "warn");
        assert_eq!(resolve_log_level(false, false, None, "trace"), "trace");
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = parse(&["skills", "--domain", "github.com", "--all", "-v"]);
        assert!(cli.verbose);
        assert_eq!(
            cli.command,
            Commands::Skills {
                domain: Some("github.com".into()),
                all: true,
                json: false
            }
        );
    }

    #[test]
    fn outcome_requires_exactly_one_result() {
        let cli = parse(&["outcome", "abc", "--failure"]);
        assert!(matches!(cli.command, Commands::Outcome { success: false, failure: true, .. }));

        let argv = ["reflex", "outcome", "abc"];
        assert!(Cli::try_parse_from(argv).is_err());
        let argv = ["reflex", "outcome", "abc", "--success", "--failure"];
        assert!(Cli::try_parse_from(argv).is_err());
    }

    #[test]
    fn verbose_and_quiet_conflict() {
        assert!(Cli::try_parse_from(["reflex", "-v", "-q", "stats"]).is_err());
    }

    #[tokio::test]
    async fn learn_then_report_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);

        let url = "https://news.ycombinator.com";
        let mut rec = TrajectoryRecorder::new("Search for rust on Hacker News", url);
        rec.record(RecordedAction::navigate(url));
        rec.record(RecordedAction::input(url, "input[name=q]", "rust"));
        let file = dir.path().join("trajectory.json");
        std::fs::write(&file, serde_json::to_string(&rec.finish(true, None)).unwrap()).unwrap();

        learn::cmd_learn(&config, &file, None).await.unwrap();

        let store = open_store(&config).unwrap();
        let skill = store.list_skills(None, false).unwrap().remove(0);
        assert_eq!(skill.name, "search_hn");

        skills::cmd_outcome(&config, &skill.id, true).unwrap();
        let after = store.get_skill_by_id(&skill.id).unwrap().unwrap();
        assert_eq!(after.success_count, 1);

        assert!(skills::cmd_outcome(&config, "missing", false).is_err());

        let trajectory = store.recent_trajectories(1).unwrap().remove(0);
        stats::cmd_trajectory(&config, &trajectory.id, false).unwrap();
        assert!(matches!(
            stats::cmd_trajectory(&config, "missing", true),
            Err(ReflexError::TrajectoryNotFound(id)) if id == "missing"
        ));
    }

    #[tokio::test]
    async fn learn_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = temp_config(&dir);
        let file = dir.path().join("bad.json");
        std::fs::write(&file, "{\"task\": 1}").unwrap();
        assert!(learn::cmd_learn(&config, &file, None).await.is_err());
    }
}

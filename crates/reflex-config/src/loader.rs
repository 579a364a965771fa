use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::schema::{ReflexConfig, WarningSeverity};

/// Loads and reloads the Reflex configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<ReflexConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > REFLEX_CONFIG env > ~/.reflex/reflex.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("REFLEX_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".reflex")
            .join("reflex.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> reflex_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::read(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            ReflexConfig::default()
        };

        let config = Self::apply_env_overrides(config);
        Self::check(&config)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    /// Wrap an already-built config (tests, embedding applications).
    pub fn from_config(config: ReflexConfig) -> reflex_core::Result<Self> {
        Self::check(&config)?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: PathBuf::new(),
        })
    }

    fn read(path: &Path) -> reflex_core::Result<ReflexConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<ReflexConfig>(&raw).map_err(|e| {
            reflex_core::ReflexError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Validate config: log warnings, fail on errors.
    fn check(config: &ReflexConfig) -> reflex_core::Result<()> {
        let (errors, warnings): (Vec<_>, Vec<_>) = config
            .findings()
            .into_iter()
            .partition(|w| w.severity == WarningSeverity::Error);
        for w in &warnings {
            warn!("{}", w);
        }
        if errors.is_empty() {
            return Ok(());
        }
        let field = errors.iter().map(|w| w.field.as_str()).collect::<Vec<_>>().join(", ");
        let reason = errors.iter().map(|w| w.message.as_str()).collect::<Vec<_>>().join("; ");
        Err(reflex_core::ReflexError::ConfigValidation { field, reason })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> ReflexConfig {
        self.config.read().clone()
    }

    /// Get a shared handle for components that re-read tuning knobs.
    pub fn shared(&self) -> Arc<RwLock<ReflexConfig>> {
        Arc::clone(&self.config)
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (REFLEX_DB_PATH, REFLEX_LOG_LEVEL, etc.)
    pub fn apply_env_overrides(config: ReflexConfig) -> ReflexConfig {
        Self::apply_overrides(config, |key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary lookup; `apply_env_overrides` passes
    /// the process environment.
    pub fn apply_overrides(
        mut config: ReflexConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> ReflexConfig {
        if let Some(v) = lookup("REFLEX_DB_PATH") {
            config.store.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("REFLEX_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Some(v) = lookup("REFLEX_LLM_MODEL") {
            config.llm.model = v;
        }
        if let Some(v) = lookup("REFLEX_ROUTER_THRESHOLD") {
            match v.parse::<f64>() {
                Ok(threshold) => config.router.skill_threshold = threshold,
                Err(_) => warn!(value = %v, "ignoring unparseable REFLEX_ROUTER_THRESHOLD"),
            }
        }
        // API key: config file takes priority, env is the fallback.
        if config.llm.api_key.is_none() {
            if let Some(v) = lookup("OPENAI_API_KEY") {
                config.llm.api_key = Some(v);
            }
        }
        config
    }

    /// Reload the config from disk. The current config is kept on error.
    pub fn reload(&self) -> reflex_core::Result<()> {
        if !self.config_path.exists() {
            return Err(reflex_core::ReflexError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::read(&self.config_path)?);
        Self::check(&new_config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }
}

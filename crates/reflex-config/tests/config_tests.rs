#[cfg(test)]
mod tests {
    use reflex_config::ConfigLoader;
    use reflex_config::schema::*;
    use std::collections::HashMap;
    use std::io::Write;

    // ── Default tests ──────────────────────────────────────────

    #[test]
    fn test_confidence_config_defaults() {
        let config = ConfidenceConfig::default();
        assert_eq!(config.initial, 0.5);
        assert_eq!(config.success_rate, 0.1);
        assert_eq!(config.failure_rate, 0.3);
        assert_eq!(config.prune_floor, 0.2);
        assert_eq!(config.reliable_threshold, 0.7);
    }

    #[test]
    fn test_router_config_defaults() {
        let config = RouterConfig::default();
        assert_eq!(config.skill_threshold, 0.35);
        assert_eq!(config.max_candidates, 5);
        assert_eq!(config.lookup_timeout_ms, 2_000);
    }

    #[test]
    fn test_matching_and_synthesis_defaults() {
        let config = ReflexConfig::default();
        assert_eq!(config.matching.trajectory_match_threshold, 0.5);
        assert_eq!(config.matching.partial_match_ceiling, 0.95);
        assert_eq!(config.synthesis.max_retries, 3);
        assert!(!config.synthesis.use_llm);
        assert!(config.extraction.llm_fallback);
        assert_eq!(config.executor.default_timeout_ms, 30_000);
    }

    #[test]
    fn test_store_path_default() {
        let config = StoreConfig::default();
        assert!(config.db_path.ends_with(".reflex/knowledge.db"));
    }

    #[test]
    fn test_llm_config_defaults() {
        let config = LlmConfig::default();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.model, "gpt-4o-mini");
        assert!(config.api_key.is_none());
        assert!(!config.is_configured());
    }

    // ── TOML roundtrip tests ───────────────────────────────────

    #[test]
    fn test_config_toml_roundtrip() {
        let config = ReflexConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let restored: ReflexConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(restored.router.skill_threshold, config.router.skill_threshold);
        assert_eq!(restored.confidence.failure_rate, config.confidence.failure_rate);
        assert_eq!(restored.llm.model, config.llm.model);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_str = r#"
[router]
skill_threshold = 0.6

[llm]
model = "gpt-4o"
"#;
        let config: ReflexConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.router.skill_threshold, 0.6);
        assert_eq!(config.router.max_candidates, 5);
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(config.confidence.initial, 0.5);
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config: ReflexConfig = toml::from_str("").unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.synthesis.max_steps, 50);
    }

    // ── Validation tests ───────────────────────────────────────

    #[test]
    fn test_default_config_validates() {
        let warnings = ReflexConfig::default().validate().unwrap();
        assert!(warnings.iter().all(|w| w.severity != WarningSeverity::Error));
    }

    #[test]
    fn test_failure_rate_must_exceed_success_rate() {
        let mut config = ReflexConfig::default();
        config.confidence.failure_rate = 0.05;
        let err = config.validate().unwrap_err();
        assert!(err.contains("confidence.failure_rate"));
    }

    #[test]
    fn test_out_of_range_threshold_is_error() {
        let mut config = ReflexConfig::default();
        config.router.skill_threshold = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.contains("router.skill_threshold"));
    }

    #[test]
    fn test_ceiling_of_one_is_error() {
        let mut config = ReflexConfig::default();
        config.matching.partial_match_ceiling = 1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prune_floor_above_reliable_is_error() {
        let mut config = ReflexConfig::default();
        config.confidence.prune_floor = 0.8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_use_llm_without_key_warns() {
        let mut config = ReflexConfig::default();
        config.synthesis.use_llm = true;
        let warnings = config.validate().unwrap();
        assert!(warnings
            .iter()
            .any(|w| w.field == "synthesis.use_llm" && w.severity == WarningSeverity::Warning));
    }

    #[test]
    fn test_unknown_log_format_warns() {
        let mut config = ReflexConfig::default();
        config.logging.format = "xml".into();
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.field == "logging.format"));
    }

    #[test]
    fn test_warning_display_includes_hint() {
        let w = ConfigWarning {
            field: "router.max_candidates".into(),
            message: "zero".into(),
            severity: WarningSeverity::Warning,
            hint: Some("Set to e.g. 5".into()),
        };
        let s = w.to_string();
        assert!(s.contains("router.max_candidates: zero"));
        assert!(s.contains("↳ Set to e.g. 5"));
    }

    // ── Loader tests ───────────────────────────────────────────

    #[test]
    fn test_loader_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[executor]\ndefault_timeout_ms = 5000\n").unwrap();

        let loader = ConfigLoader::load(Some(file.path())).unwrap();
        assert_eq!(loader.get().executor.default_timeout_ms, 5000);
        assert_eq!(loader.path(), file.path());
    }

    #[test]
    fn test_loader_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let loader = ConfigLoader::load(Some(path.as_path())).unwrap();
        assert_eq!(loader.get().router.max_candidates, 5);
    }

    #[test]
    fn test_loader_rejects_invalid_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[router\nskill_threshold = ").unwrap();
        assert!(ConfigLoader::load(Some(file.path())).is_err());
    }

    #[test]
    fn test_loader_rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[confidence]\nsuccess_rate = 0.5\nfailure_rate = 0.2\n").unwrap();
        let err = ConfigLoader::load(Some(file.path())).err().unwrap();
        assert!(err.to_string().contains("failure_rate"));
    }

    #[test]
    fn test_reload_picks_up_changes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[router]\nmax_candidates = 3\n").unwrap();
        let loader = ConfigLoader::load(Some(file.path())).unwrap();
        let shared = loader.shared();
        assert_eq!(shared.read().router.max_candidates, 3);

        std::fs::write(file.path(), "[router]\nmax_candidates = 9\n").unwrap();
        loader.reload().unwrap();
        assert_eq!(loader.get().router.max_candidates, 9);
        assert_eq!(shared.read().router.max_candidates, 9);
    }

    #[test]
    fn test_reload_keeps_config_on_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[router]\nmax_candidates = 4\n").unwrap();
        let loader = ConfigLoader::load(Some(file.path())).unwrap();

        std::fs::write(file.path(), "[router]\nskill_threshold = 7.0\n").unwrap();
        assert!(loader.reload().is_err());
        assert_eq!(loader.get().router.max_candidates, 4);
    }

    #[test]
    fn test_overrides_from_lookup() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("REFLEX_DB_PATH", "/tmp/reflex-test.db"),
            ("REFLEX_LOG_LEVEL", "debug"),
            ("REFLEX_ROUTER_THRESHOLD", "0.5"),
            ("OPENAI_API_KEY", "sk-test"),
        ]);
        let config = ConfigLoader::apply_overrides(ReflexConfig::default(), |k| {
            env.get(k).map(|v| v.to_string())
        });
        assert_eq!(config.store.db_path.to_str(), Some("/tmp/reflex-test.db"));
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.router.skill_threshold, 0.5);
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_file_api_key_beats_env() {
        let mut config = ReflexConfig::default();
        config.llm.api_key = Some("from-file".into());
        let config = ConfigLoader::apply_overrides(config, |k| {
            (k == "OPENAI_API_KEY").then(|| "from-env".to_string())
        });
        assert_eq!(config.llm.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_unparseable_threshold_override_is_ignored() {
        let config = ConfigLoader::apply_overrides(ReflexConfig::default(), |k| {
            (k == "REFLEX_ROUTER_THRESHOLD").then(|| "high".to_string())
        });
        assert_eq!(config.router.skill_threshold, 0.35);
    }

    #[test]
    fn test_from_config_validates() {
        let mut config = ReflexConfig::default();
        config.executor.default_timeout_ms = 0;
        assert!(ConfigLoader::from_config(config).is_err());
        assert!(ConfigLoader::from_config(ReflexConfig::default()).is_ok());
    }

    #[test]
    fn test_validation_error_names_every_failing_field() {
        let mut config = ReflexConfig::default();
        config.executor.default_timeout_ms = 0;
        config.router.skill_threshold = 1.5;
        config.logging.format = "xml".into();
        match ConfigLoader::from_config(config).err().unwrap() {
            reflex_core::ReflexError::ConfigValidation { field, reason } => {
                assert_eq!(field, "router.skill_threshold, executor.default_timeout_ms");
                assert!(reason.contains("outside [0, 1]"));
                assert!(!field.contains("logging.format"));
            }
            other => panic!("expected a validation error, got {other:?}"),
        }
    }
}

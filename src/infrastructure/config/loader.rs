use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid workers: {0}. Must be at least 1")]
    InvalidWorkers(usize),

    #[error("Invalid lookup_timeout_ms: must be positive")]
    InvalidLookupTimeout,

    #[error("Invalid sync_interval_secs: must be positive")]
    InvalidSyncInterval,

    #[error("Invalid io_timeout_ms: must be positive")]
    InvalidIoTimeout,

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .remedy/config.yaml (project config)
    /// 3. .remedy/local.yaml (local overrides, optional)
    /// 4. Environment variables (REMEDY_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Self::figment()
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".remedy/config.yaml"))
            .merge(Yaml::file(".remedy/local.yaml"))
            .merge(Env::prefixed("REMEDY_").split("__"))
    }

    /// Load configuration from a specific file, still honoring env overrides
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("REMEDY_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.intake.workers == 0 {
            return Err(ConfigError::InvalidWorkers(config.intake.workers));
        }

        if config.intake.lookup_timeout_ms == 0 {
            return Err(ConfigError::InvalidLookupTimeout);
        }

        if config.persistence.sync_interval_secs == 0 {
            return Err(ConfigError::InvalidSyncInterval);
        }

        if config.persistence.io_timeout_ms == 0 {
            return Err(ConfigError::InvalidIoTimeout);
        }

        if config.persistence.database_path.trim().is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CooldownStart, RotationPolicy};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.intake.workers, 4);
        assert_eq!(config.intake.lookup_timeout_ms, 5000);
        assert_eq!(config.intake.cooldown_start, CooldownStart::Completion);
        assert_eq!(config.persistence.sync_interval_secs, 60);
        assert_eq!(config.persistence.min_persist_secs, 3600);
        assert_eq!(config.persistence.database_path, ".remedy/cooldowns.db");
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
logging:
  level: debug
  format: pretty
  rotation: hourly
intake:
  workers: 8
  cooldown_start: admission
persistence:
  sync_interval_secs: 30
  database_path: /var/lib/remedy/state.db
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.rotation, RotationPolicy::Hourly);
        assert_eq!(config.intake.workers, 8);
        assert_eq!(config.intake.lookup_timeout_ms, 5000);
        assert_eq!(config.intake.cooldown_start, CooldownStart::Admission);
        assert_eq!(config.persistence.sync_interval_secs, 30);
        assert_eq!(config.persistence.min_persist_secs, 3600);
        assert_eq!(config.persistence.database_path, "/var/lib/remedy/state.db");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel("verbose".to_string()))
        );
    }

    #[test]
    fn test_validate_invalid_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogFormat(_))
        ));
    }

    #[test]
    fn test_validate_zero_values() {
        let mut config = Config::default();
        config.intake.workers = 0;
        assert_eq!(ConfigLoader::validate(&config), Err(ConfigError::InvalidWorkers(0)));

        let mut config = Config::default();
        config.intake.lookup_timeout_ms = 0;
        assert_eq!(ConfigLoader::validate(&config), Err(ConfigError::InvalidLookupTimeout));

        let mut config = Config::default();
        config.persistence.sync_interval_secs = 0;
        assert_eq!(ConfigLoader::validate(&config), Err(ConfigError::InvalidSyncInterval));

        let mut config = Config::default();
        config.persistence.io_timeout_ms = 0;
        assert_eq!(ConfigLoader::validate(&config), Err(ConfigError::InvalidIoTimeout));
    }

    #[test]
    fn test_validate_empty_database_path() {
        let mut config = Config::default();
        config.persistence.database_path = "  ".to_string();
        assert_eq!(ConfigLoader::validate(&config), Err(ConfigError::EmptyDatabasePath));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "intake:\n  workers: 2\n").unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.intake.workers, 2);
        assert_eq!(config.persistence.sync_interval_secs, 60);
    }

    #[test]
    fn test_load_from_file_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "logging:\n  level: loud\n").unwrap();
        assert!(ConfigLoader::load_from_file(&path).is_err());
    }
}

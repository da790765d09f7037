use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Main configuration structure for remedy-intake
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Event intake configuration
    #[serde(default)]
    pub intake: IntakeConfig,

    /// Cooldown persistence configuration
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rotated JSON log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Also log to stdout when a log directory is set
    #[serde(default = "default_true")]
    pub enable_stdout: bool,

    /// Rotation for file output
    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

const fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            enable_stdout: true,
            rotation: RotationPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// When a cooldown starts for an admitted event
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CooldownStart {
    /// Inside the atomic admit step
    Admission,
    /// When the downstream consumer confirms dispatch
    #[default]
    Completion,
}

/// Event intake configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IntakeConfig {
    /// Concurrent intake workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Deadline for a single object lookup, in milliseconds
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,

    /// When cooldowns begin
    #[serde(default)]
    pub cooldown_start: CooldownStart,
}

const fn default_workers() -> usize {
    4
}

const fn default_lookup_timeout_ms() -> u64 {
    5000
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
            cooldown_start: CooldownStart::default(),
        }
    }
}

impl IntakeConfig {
    pub const fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

/// Cooldown persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PersistenceConfig {
    /// Seconds between background flushes
    #[serde(default = "default_sync_interval_secs")]
    pub sync_interval_secs: u64,

    /// Cooldowns shorter than this are never persisted
    #[serde(default = "default_min_persist_secs")]
    pub min_persist_secs: u64,

    /// Deadline for a single store read or write, in milliseconds
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,

    /// Path to the SQLite record store used by the CLI
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

const fn default_sync_interval_secs() -> u64 {
    60
}

const fn default_min_persist_secs() -> u64 {
    3600
}

const fn default_io_timeout_ms() -> u64 {
    10_000
}

fn default_database_path() -> String {
    ".remedy/cooldowns.db".to_string()
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: default_sync_interval_secs(),
            min_persist_secs: default_min_persist_secs(),
            io_timeout_ms: default_io_timeout_ms(),
            database_path: default_database_path(),
        }
    }
}

impl PersistenceConfig {
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub const fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn min_persist_duration(&self) -> chrono::Duration {
        i64::try_from(self.min_persist_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::TimeDelta::MAX)
    }
}

//! Configuration management infrastructure
//!
//! Hierarchical configuration using figment:
//! - YAML file loading
//! - Environment variable overrides (`REMEDY_*`)
//! - Configuration validation

pub mod loader;

pub use loader::{ConfigError, ConfigLoader};

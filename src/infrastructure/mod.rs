//! Infrastructure layer module
//!
//! - Clocks (system and manually driven)
//! - Configuration management
//! - Logging infrastructure

pub mod clock;
pub mod config;
pub mod logging;

pub use clock::{ManualClock, SystemClock};
pub use config::{ConfigError, ConfigLoader};
pub use logging::LoggerImpl;

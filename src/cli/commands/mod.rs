//! CLI command implementations.

pub mod cooldowns;
pub mod policy;
pub mod run;

//! Adapters for external systems: backing stores and local inputs.

pub mod files;
pub mod memory;
pub mod sqlite;

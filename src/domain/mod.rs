//! Domain layer for the remedy intake engine
//!
//! This module contains the event, policy and suppression models, the ports
//! the engine consumes, and the domain error types.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{DomainError, DomainResult, LookupError, StoreError};

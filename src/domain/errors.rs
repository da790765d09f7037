//! Domain errors for the remedy intake engine.
//!
//! None of these ever terminate the admission path: lookups fail open and
//! store failures leave cooldowns dirty for the next flush cycle.

use thiserror::Error;

/// Errors raised while loading policies, inventories and event streams.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for DomainError {
    fn from(err: serde_yaml::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DomainError {
    fn from(err: std::io::Error) -> Self {
        DomainError::Io(err.to_string())
    }
}

/// Failure of an object lookup against the cluster.
///
/// A missing object is *not* an error; lookups report it as `Ok(None)`.
/// Every variant here is ambiguous and is treated as "proceed".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("lookup timed out after {0}ms")]
    Timeout(u64),

    #[error("access denied: {0}")]
    Forbidden(String),

    #[error("cluster API unavailable: {0}")]
    Unavailable(String),

    #[error("transient lookup failure: {0}")]
    Transient(String),
}

/// Failure of the cooldown record backing store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record {namespace}/{name} already exists")]
    AlreadyExists { namespace: String, name: String },

    #[error("record {namespace}/{name} not found")]
    NotFound { namespace: String, name: String },

    #[error("store operation timed out after {0}ms")]
    Timeout(u64),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Backend(format!("record encoding: {err}"))
    }
}

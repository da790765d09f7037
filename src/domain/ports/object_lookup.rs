//! Cluster object lookup port.

use async_trait::async_trait;

use crate::domain::errors::LookupError;
use crate::domain::models::{DynamicObject, ObjectRef};

/// Kind-agnostic object lookup.
///
/// `Ok(None)` means the object definitively does not exist. Every `Err` is an
/// ambiguous outcome and callers must fail open on it.
#[async_trait]
pub trait ObjectLookup: Send + Sync {
    async fn get(&self, object: &ObjectRef) -> Result<Option<DynamicObject>, LookupError>;
}

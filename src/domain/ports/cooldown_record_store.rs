//! Backing store port for persisted cooldown records.

use async_trait::async_trait;

use crate::domain::errors::StoreError;
use crate::domain::models::CooldownStateRecord;

/// Namespace-scoped CRUD over cooldown records.
#[async_trait]
pub trait CooldownRecordStore: Send + Sync {
    /// Fetch a record; `Ok(None)` when absent.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<CooldownStateRecord>, StoreError>;

    /// Create a record. Fails with `StoreError::AlreadyExists` if present.
    async fn create(&self, record: &CooldownStateRecord) -> Result<(), StoreError>;

    /// Replace an existing record. Fails with `StoreError::NotFound` if absent.
    async fn replace(&self, record: &CooldownStateRecord) -> Result<(), StoreError>;

    /// All records, optionally restricted to one namespace.
    async fn list(&self, namespace: Option<&str>) -> Result<Vec<CooldownStateRecord>, StoreError>;

    /// Delete a record. Deleting an absent record is not an error.
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}

//! In-memory object inventory implementing `ObjectLookup`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::LookupError;
use crate::domain::models::{DynamicObject, ObjectRef};
use crate::domain::ports::ObjectLookup;

type InventoryKey = (String, String, String);

fn inventory_key(kind: &str, namespace: &str, name: &str) -> InventoryKey {
    (kind.to_string(), namespace.to_string(), name.to_string())
}

/// Object inventory held in memory.
///
/// Objects are keyed by kind, namespace and name; the API version is not
/// part of the key so `v1` and `apps/v1` references to the same object agree.
/// Supports injected failures and latency for fail-open tests.
#[derive(Clone, Default)]
pub struct InMemoryObjectLookup {
    objects: Arc<RwLock<HashMap<InventoryKey, DynamicObject>>>,
    failure: Arc<RwLock<Option<LookupError>>>,
    failing_objects: Arc<RwLock<HashMap<InventoryKey, LookupError>>>,
    latency: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl InMemoryObjectLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an inventory from a list of objects.
    pub fn from_objects(objects: impl IntoIterator<Item = DynamicObject>) -> Self {
        let map = objects
            .into_iter()
            .map(|obj| {
                let key = inventory_key(&obj.kind, &obj.metadata.namespace, &obj.metadata.name);
                (key, obj)
            })
            .collect();
        Self {
            objects: Arc::new(RwLock::new(map)),
            ..Self::default()
        }
    }

    /// Delay every lookup by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn insert(&self, object: DynamicObject) {
        let key = inventory_key(&object.kind, &object.metadata.namespace, &object.metadata.name);
        self.objects.write().await.insert(key, object);
    }

    pub async fn remove(&self, kind: &str, namespace: &str, name: &str) {
        self.objects
            .write()
            .await
            .remove(&inventory_key(kind, namespace, name));
    }

    /// Fail every lookup with `error` until [`recover`](Self::recover).
    pub async fn fail_with(&self, error: LookupError) {
        *self.failure.write().await = Some(error);
    }

    /// Fail lookups of one object only.
    pub async fn fail_object_with(&self, kind: &str, namespace: &str, name: &str, error: LookupError) {
        self.failing_objects
            .write()
            .await
            .insert(inventory_key(kind, namespace, name), error);
    }

    pub async fn recover(&self) {
        *self.failure.write().await = None;
        self.failing_objects.write().await.clear();
    }

    /// Number of lookups served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectLookup for InMemoryObjectLookup {
    async fn get(&self, object: &ObjectRef) -> Result<Option<DynamicObject>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = self.failure.read().await.clone() {
            return Err(err);
        }

        let key = inventory_key(&object.kind, &object.namespace, &object.name);
        if let Some(err) = self.failing_objects.read().await.get(&key) {
            return Err(err.clone());
        }
        Ok(self.objects.read().await.get(&key).cloned())
    }
}

/// Lookup used when no cluster connection or inventory is configured.
///
/// Every call is ambiguous, so the engine fails open on all of them.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableObjectLookup;

#[async_trait]
impl ObjectLookup for UnavailableObjectLookup {
    async fn get(&self, _object: &ObjectRef) -> Result<Option<DynamicObject>, LookupError> {
        Err(LookupError::Unavailable("no object inventory configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_ignores_api_version() {
        let lookup = InMemoryObjectLookup::from_objects([DynamicObject::new(
            "apps/v1",
            "ReplicaSet",
            "default",
            "web-7d4b9c8f6d",
        )]);
        let found = lookup
            .get(&ObjectRef::new("", "ReplicaSet", "default", "web-7d4b9c8f6d"))
            .await
            .unwrap();
        assert!(found.is_some());
        assert_eq!(lookup.calls(), 1);
    }

    #[tokio::test]
    async fn test_per_object_failure() {
        let lookup = InMemoryObjectLookup::new();
        lookup
            .fail_object_with("Pod", "default", "web-0", LookupError::Transient("etcd".into()))
            .await;
        let result = lookup.get(&ObjectRef::new("v1", "Pod", "default", "web-0")).await;
        assert!(result.is_err());

        let other = lookup.get(&ObjectRef::new("v1", "Pod", "default", "web-1")).await;
        assert_eq!(other, Ok(None));

        lookup.recover().await;
        assert_eq!(lookup.get(&ObjectRef::new("v1", "Pod", "default", "web-0")).await, Ok(None));
    }

    #[tokio::test]
    async fn test_unavailable_lookup_always_errors() {
        let result = UnavailableObjectLookup
            .get(&ObjectRef::new("v1", "Pod", "default", "web-0"))
            .await;
        assert!(matches!(result, Err(LookupError::Unavailable(_))));
    }
}

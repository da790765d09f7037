//! In-memory cooldown record store.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::StoreError;
use crate::domain::models::CooldownStateRecord;
use crate::domain::ports::CooldownRecordStore;

type RecordKey = (String, String);

/// Record store held in memory, with per-namespace failure, latency and
/// create-race injection.
#[derive(Clone, Default)]
pub struct InMemoryRecordStore {
    records: Arc<RwLock<BTreeMap<RecordKey, CooldownStateRecord>>>,
    failing_namespaces: Arc<RwLock<HashSet<String>>>,
    writes: Arc<AtomicUsize>,
    latency: Option<Duration>,
    race_next_create: Arc<AtomicBool>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Let another writer win the next `create`: its copy of the record
    /// lands first and the call reports `AlreadyExists`.
    pub fn race_next_create(&self) {
        self.race_next_create.store(true, Ordering::SeqCst);
    }

    /// Make every operation in `namespace` fail until [`heal`](Self::heal).
    pub async fn fail_namespace(&self, namespace: impl Into<String>) {
        self.failing_namespaces.write().await.insert(namespace.into());
    }

    pub async fn heal(&self) {
        self.failing_namespaces.write().await.clear();
    }

    /// Store a record directly, bypassing failure injection.
    pub async fn put(&self, record: CooldownStateRecord) {
        let key = (record.metadata.namespace.clone(), record.metadata.name.clone());
        self.records.write().await.insert(key, record);
    }

    /// Successful create/replace calls so far.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    async fn check_namespace(&self, namespace: &str) -> Result<(), StoreError> {
        self.delay().await;
        if self.failing_namespaces.read().await.contains(namespace) {
            return Err(StoreError::Backend(format!("namespace {namespace} unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl CooldownRecordStore for InMemoryRecordStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<CooldownStateRecord>, StoreError> {
        self.check_namespace(namespace).await?;
        Ok(self
            .records
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create(&self, record: &CooldownStateRecord) -> Result<(), StoreError> {
        let namespace = &record.metadata.namespace;
        let name = &record.metadata.name;
        self.check_namespace(namespace).await?;

        let mut records = self.records.write().await;
        let key = (namespace.clone(), name.clone());
        if self.race_next_create.swap(false, Ordering::SeqCst) {
            let mut rival = record.clone();
            rival.data.clear();
            records.insert(key.clone(), rival);
        }
        if records.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                namespace: namespace.clone(),
                name: name.clone(),
            });
        }
        records.insert(key, record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn replace(&self, record: &CooldownStateRecord) -> Result<(), StoreError> {
        let namespace = &record.metadata.namespace;
        let name = &record.metadata.name;
        self.check_namespace(namespace).await?;

        let mut records = self.records.write().await;
        match records.get_mut(&(namespace.clone(), name.clone())) {
            Some(existing) => {
                *existing = record.clone();
                self.writes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(StoreError::NotFound {
                namespace: namespace.clone(),
                name: name.clone(),
            }),
        }
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<CooldownStateRecord>, StoreError> {
        match namespace {
            Some(ns) => self.check_namespace(ns).await?,
            None => self.delay().await,
        }
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|((ns, _), _)| namespace.is_none_or(|wanted| wanted == ns))
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.check_namespace(namespace).await?;
        self.records
            .write()
            .await
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }
}

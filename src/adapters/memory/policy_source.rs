//! In-memory policy source.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::models::RemediationPolicy;
use crate::domain::ports::PolicySource;

/// Ordered list of policies held in memory.
#[derive(Clone, Default)]
pub struct InMemoryPolicySource {
    policies: Arc<RwLock<Vec<RemediationPolicy>>>,
}

impl InMemoryPolicySource {
    pub fn new(policies: Vec<RemediationPolicy>) -> Self {
        Self {
            policies: Arc::new(RwLock::new(policies)),
        }
    }

    /// Add or replace (by namespace/name) a policy.
    pub async fn upsert(&self, policy: RemediationPolicy) {
        let mut policies = self.policies.write().await;
        if let Some(existing) = policies.iter_mut().find(|p| {
            p.metadata.namespace == policy.metadata.namespace && p.metadata.name == policy.metadata.name
        }) {
            *existing = policy;
        } else {
            policies.push(policy);
        }
    }

    /// Remove a policy, returning it if it existed.
    pub async fn remove(&self, namespace: &str, name: &str) -> Option<RemediationPolicy> {
        let mut policies = self.policies.write().await;
        let idx = policies
            .iter()
            .position(|p| p.metadata.namespace == namespace && p.metadata.name == name)?;
        Some(policies.remove(idx))
    }
}

#[async_trait]
impl PolicySource for InMemoryPolicySource {
    async fn list(&self) -> Vec<RemediationPolicy> {
        self.policies.read().await.clone()
    }

    async fn get(&self, namespace: &str, name: &str) -> Option<RemediationPolicy> {
        self.policies
            .read()
            .await
            .iter()
            .find(|p| p.metadata.namespace == namespace && p.metadata.name == name)
            .cloned()
    }
}

//! Policy source port.

use async_trait::async_trait;

use crate::domain::models::RemediationPolicy;

/// Read-only view of the current remediation policies.
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// All policies, in evaluation order.
    async fn list(&self) -> Vec<RemediationPolicy>;

    /// A single policy; `None` once it has been deleted.
    async fn get(&self, namespace: &str, name: &str) -> Option<RemediationPolicy>;
}

//! Suppression keys: the identity rate limits and cooldowns are tracked under.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::object::ObjectRef;
use super::policy::PolicyRef;

/// Stable identity of the object an event is grouped under.
///
/// After owner resolution this is usually the owning workload
/// (`Deployment:web`) rather than the ephemeral pod that emitted the event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectIdentity {
    pub namespace: String,
    pub kind: String,
    pub name: String,
}

impl ObjectIdentity {
    pub fn new(namespace: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// `Kind:name`
    pub fn identifier(&self) -> String {
        format!("{}:{}", self.kind, self.name)
    }
}

impl From<&ObjectRef> for ObjectIdentity {
    fn from(object: &ObjectRef) -> Self {
        Self::new(object.namespace.clone(), object.kind.clone(), object.name.clone())
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.namespace, self.kind, self.name)
    }
}

/// Composite key: policy + resolved object identity + event reason.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SuppressionKey {
    pub policy: PolicyRef,
    pub object: ObjectIdentity,
    pub reason: String,
}

impl SuppressionKey {
    pub fn new(policy: PolicyRef, object: ObjectIdentity, reason: impl Into<String>) -> Self {
        Self {
            policy,
            object,
            reason: reason.into(),
        }
    }

    /// Policy-local form used inside persisted records:
    /// `<object-namespace>/<Kind>:<name>/<reason>`.
    pub fn short_key(&self) -> String {
        format!("{}/{}/{}", self.object.namespace, self.object.identifier(), self.reason)
    }

    /// Inverse of [`short_key`](Self::short_key), scoped back under `policy`.
    ///
    /// The reason is the remainder after the second `/`, so reasons that
    /// contain slashes survive the round trip.
    pub fn from_short_key(policy: &PolicyRef, short_key: &str) -> Option<Self> {
        let mut parts = short_key.splitn(3, '/');
        let namespace = parts.next()?;
        let identifier = parts.next()?;
        let reason = parts.next()?;
        let (kind, name) = identifier.split_once(':')?;
        if kind.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(
            policy.clone(),
            ObjectIdentity::new(namespace, kind, name),
            reason,
        ))
    }
}

impl fmt::Display for SuppressionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.policy, self.short_key())
    }
}

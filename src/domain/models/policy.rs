//! Remediation policy model.
//!
//! Policies are owned by the CRD layer; the intake engine only reads them.
//! Field names follow the custom resource's camelCase schema.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Compiled fallback when neither selector nor policy sets a mode.
pub const DEFAULT_MODE: Mode = Mode::Manual;
/// Compiled fallback confidence threshold.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.8;
/// Compiled fallback risk level.
pub const DEFAULT_RISK: RiskLevel = RiskLevel::Low;

/// How downstream remediation is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Propose a remediation and wait for a human.
    Manual,
    /// Apply remediations that clear the confidence threshold.
    Auto,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

/// Maximum risk a remediation may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Namespace/name pair identifying a policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyRef {
    pub namespace: String,
    pub name: String,
}

impl PolicyRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// One ordered event selector. Empty fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSelector {
    /// Event type (`Normal`, `Warning`), exact match.
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub reason: String,
    /// Involved object kind, exact match.
    #[serde(default)]
    pub kind: String,
    /// Involved object namespace, exact match.
    #[serde(default)]
    pub namespace: String,
    /// Regular expression searched in the event message.
    #[serde(default)]
    pub message: String,
    pub mode: Option<Mode>,
    pub confidence_threshold: Option<f64>,
    pub risk: Option<RiskLevel>,
}

/// Per-policy admission budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSpec {
    #[serde(default = "default_events_per_minute")]
    pub events_per_minute: u32,
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: u32,
}

const fn default_events_per_minute() -> u32 {
    5
}

const fn default_cooldown_minutes() -> u32 {
    15
}

impl Default for RateLimitSpec {
    fn default() -> Self {
        Self {
            events_per_minute: default_events_per_minute(),
            cooldown_minutes: default_cooldown_minutes(),
        }
    }
}

impl RateLimitSpec {
    pub fn cooldown(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.cooldown_minutes))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistenceSpec {
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    #[serde(default)]
    pub selectors: Vec<EventSelector>,
    pub mode: Option<Mode>,
    pub confidence_threshold: Option<f64>,
    pub risk: Option<RiskLevel>,
    #[serde(default)]
    pub rate_limit: RateLimitSpec,
    #[serde(default)]
    pub persistence: PersistenceSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyMeta {
    pub name: String,
    pub namespace: String,
    /// Nil when omitted from a manifest; see [`RemediationPolicy::with_stable_uid`].
    #[serde(default)]
    pub uid: Uuid,
}

/// A remediation policy resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationPolicy {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    pub metadata: PolicyMeta,
    #[serde(default)]
    pub spec: PolicySpec,
}

fn default_api_version() -> String {
    RemediationPolicy::API_VERSION.to_string()
}

fn default_kind() -> String {
    RemediationPolicy::KIND.to_string()
}

impl RemediationPolicy {
    pub const API_VERSION: &'static str = "remedy.io/v1alpha1";
    pub const KIND: &'static str = "RemediationPolicy";

    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_kind(),
            metadata: PolicyMeta {
                name: name.into(),
                namespace: namespace.into(),
                uid: Uuid::new_v4(),
            },
            spec: PolicySpec::default(),
        }
    }

    pub fn with_selector(mut self, selector: EventSelector) -> Self {
        self.spec.selectors.push(selector);
        self
    }

    pub fn with_rate_limit(mut self, events_per_minute: u32, cooldown_minutes: u32) -> Self {
        self.spec.rate_limit = RateLimitSpec {
            events_per_minute,
            cooldown_minutes,
        };
        self
    }

    pub fn with_persistence(mut self, enabled: bool) -> Self {
        self.spec.persistence.enabled = enabled;
        self
    }

    /// Give a policy loaded without a UID one derived from its namespace and
    /// name, so its persisted records keep their owner across restarts.
    pub fn with_stable_uid(mut self) -> Self {
        if self.metadata.uid.is_nil() {
            let seed = format!("{}/{}", self.metadata.namespace, self.metadata.name);
            self.metadata.uid = Uuid::new_v5(&Uuid::NAMESPACE_OID, seed.as_bytes());
        }
        self
    }

    pub fn policy_ref(&self) -> PolicyRef {
        PolicyRef::new(self.metadata.namespace.clone(), self.metadata.name.clone())
    }

    pub fn persistence_enabled(&self) -> bool {
        self.spec.persistence.enabled
    }
}

/// File format holding several policies (`policies:` list).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyList {
    #[serde(default)]
    pub policies: Vec<RemediationPolicy>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_yaml_defaults() {
        let yaml = r"
metadata:
  name: crashloops
  namespace: ops
spec:
  selectors:
    - type: Warning
      reason: BackOff
      message: 'restarting failed container'
      risk: medium
";
        let policy: RemediationPolicy = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(policy.kind, RemediationPolicy::KIND);
        assert_eq!(policy.spec.rate_limit, RateLimitSpec::default());
        assert!(!policy.persistence_enabled());
        assert_eq!(policy.spec.selectors[0].risk, Some(RiskLevel::Medium));
        assert_eq!(policy.spec.selectors[0].kind, "");
        assert_eq!(policy.policy_ref().to_string(), "ops/crashloops");
        assert!(policy.metadata.uid.is_nil());
    }

    #[test]
    fn test_stable_uid_is_deterministic() {
        let mut a = RemediationPolicy::new("ops", "p");
        a.metadata.uid = Uuid::nil();
        let b = a.clone();
        let (a, b) = (a.with_stable_uid(), b.with_stable_uid());
        assert!(!a.metadata.uid.is_nil());
        assert_eq!(a.metadata.uid, b.metadata.uid);

        let explicit = RemediationPolicy::new("ops", "p");
        let uid = explicit.metadata.uid;
        assert_eq!(explicit.with_stable_uid().metadata.uid, uid);
    }

    #[test]
    fn test_rate_limit_cooldown_duration() {
        let policy = RemediationPolicy::new("ops", "p").with_rate_limit(2, 10);
        assert_eq!(policy.spec.rate_limit.cooldown(), chrono::Duration::minutes(10));
    }
}

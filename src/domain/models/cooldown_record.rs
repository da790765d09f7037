//! Persisted cooldown state, one ConfigMap-shaped record per policy.
//!
//! ```yaml
//! metadata:
//!   name: <policy>-cooldown-state
//!   namespace: <policy namespace>
//!   ownerReferences: [<the policy>]
//! data:
//!   cooldowns: '{"default/Deployment:web/BackOff": "2026-01-01T12:00:00Z"}'
//!   version: "1"
//!   lastSync: "2026-01-01T10:00:00Z"
//! ```

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::object::OwnerReference;
use super::policy::{PolicyRef, RemediationPolicy};
use super::suppression::SuppressionKey;

/// Only records carrying exactly this version are read back.
pub const RECORD_FORMAT_VERSION: &str = "1";

pub const DATA_COOLDOWNS: &str = "cooldowns";
pub const DATA_VERSION: &str = "version";
pub const DATA_LAST_SYNC: &str = "lastSync";

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "remedy-intake";

/// Name of the record backing `policy`.
pub fn record_name(policy_name: &str) -> String {
    format!("{policy_name}-cooldown-state")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// The stored record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownStateRecord {
    pub metadata: RecordMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// Why a stored record was rejected on load.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RecordDecodeError {
    #[error("unsupported record version {found:?} (expected \"1\")")]
    VersionMismatch { found: Option<String> },

    #[error("malformed record: {0}")]
    Malformed(String),
}

impl CooldownStateRecord {
    /// Encode `entries` for `policy`, owner-referenced to it.
    ///
    /// Keys belonging to other policies are ignored.
    pub fn encode(
        policy: &RemediationPolicy,
        entries: &HashMap<SuppressionKey, DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let policy_ref = policy.policy_ref();
        let cooldowns: BTreeMap<String, String> = entries
            .iter()
            .filter(|(key, _)| key.policy == policy_ref)
            .map(|(key, until)| (key.short_key(), format_timestamp(*until)))
            .collect();

        let mut data = BTreeMap::new();
        data.insert(DATA_COOLDOWNS.to_string(), serde_json::to_string(&cooldowns)?);
        data.insert(DATA_VERSION.to_string(), RECORD_FORMAT_VERSION.to_string());
        data.insert(DATA_LAST_SYNC.to_string(), format_timestamp(now));

        let mut labels = BTreeMap::new();
        labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string());

        Ok(Self {
            metadata: RecordMeta {
                name: record_name(&policy.metadata.name),
                namespace: policy.metadata.namespace.clone(),
                owner_references: vec![OwnerReference {
                    api_version: policy.api_version.clone(),
                    kind: policy.kind.clone(),
                    name: policy.metadata.name.clone(),
                    uid: policy.metadata.uid.to_string(),
                    controller: true,
                }],
                labels,
            },
            data,
        })
    }

    /// Decode into fully-scoped keys, dropping entries not after `now`.
    ///
    /// Any unparseable key or timestamp rejects the whole record.
    pub fn decode(
        &self,
        policy: &PolicyRef,
        now: DateTime<Utc>,
    ) -> Result<HashMap<SuppressionKey, DateTime<Utc>>, RecordDecodeError> {
        let version = self.data.get(DATA_VERSION);
        if version.map(String::as_str) != Some(RECORD_FORMAT_VERSION) {
            return Err(RecordDecodeError::VersionMismatch {
                found: version.cloned(),
            });
        }

        let raw = self
            .data
            .get(DATA_COOLDOWNS)
            .ok_or_else(|| RecordDecodeError::Malformed(format!("missing {DATA_COOLDOWNS:?}")))?;
        let cooldowns: BTreeMap<String, String> = serde_json::from_str(raw)
            .map_err(|e| RecordDecodeError::Malformed(e.to_string()))?;

        let mut entries = HashMap::with_capacity(cooldowns.len());
        for (short_key, timestamp) in cooldowns {
            let key = SuppressionKey::from_short_key(policy, &short_key)
                .ok_or_else(|| RecordDecodeError::Malformed(format!("bad key {short_key:?}")))?;
            let until = parse_timestamp(&timestamp)
                .ok_or_else(|| RecordDecodeError::Malformed(format!("bad timestamp {timestamp:?}")))?;
            if until > now {
                entries.insert(key, until);
            }
        }
        Ok(entries)
    }

    /// Owner UID, if the record is owned by a policy.
    pub fn owner_uid(&self) -> Option<&str> {
        self.metadata
            .owner_references
            .iter()
            .find(|o| o.kind == RemediationPolicy::KIND)
            .map(|o| o.uid.as_str())
    }

    pub fn is_managed(&self) -> bool {
        self.metadata.labels.get(MANAGED_BY_LABEL).map(String::as_str) == Some(MANAGED_BY_VALUE)
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        self.data.get(DATA_LAST_SYNC).and_then(|s| parse_timestamp(s))
    }

    /// Raw `shortKey -> timestamp` entries, without validation.
    pub fn raw_cooldowns(&self) -> BTreeMap<String, String> {
        self.data
            .get(DATA_COOLDOWNS)
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

//! File loaders for offline replay: policies, object inventory, events.
//!
//! Policies and inventory are YAML, either as a multi-document stream of
//! single resources or as one list document (`policies:` / `items:`).
//! Events are JSON lines, one core/v1 Event per line.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ClusterEvent, DynamicObject, PolicyList, RemediationPolicy};

fn read_to_string(path: &Path) -> DomainResult<String> {
    std::fs::read_to_string(path).map_err(|e| DomainError::Io(format!("{}: {}", path.display(), e)))
}

/// Parse every YAML document in `content`. A document holding a list under
/// `list_key` contributes each list item.
fn parse_yaml_documents<T: DeserializeOwned>(content: &str, list_key: &str) -> DomainResult<Vec<T>> {
    let mut items = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        match value.get(list_key) {
            Some(list) => items.extend(serde_yaml::from_value::<Vec<T>>(list.clone())?),
            None => items.push(serde_yaml::from_value(value)?),
        }
    }
    Ok(items)
}

/// Parse policies. Policies without a UID get a stable one.
pub fn parse_policies(content: &str) -> DomainResult<Vec<RemediationPolicy>> {
    let policies: Vec<RemediationPolicy> = parse_yaml_documents(content, "policies")?;
    Ok(policies.into_iter().map(RemediationPolicy::with_stable_uid).collect())
}

pub fn load_policies(path: &Path) -> DomainResult<Vec<RemediationPolicy>> {
    parse_policies(&read_to_string(path)?)
}

/// Round-trip form of a policy file.
pub fn render_policies(policies: &[RemediationPolicy]) -> DomainResult<String> {
    Ok(serde_yaml::to_string(&PolicyList {
        policies: policies.to_vec(),
    })?)
}

pub fn parse_inventory(content: &str) -> DomainResult<Vec<DynamicObject>> {
    parse_yaml_documents(content, "items")
}

pub fn load_inventory(path: &Path) -> DomainResult<Vec<DynamicObject>> {
    parse_inventory(&read_to_string(path)?)
}

/// Parse one JSON-lines event. Blank lines and `#` comments yield `None`.
pub fn parse_event_line(line: &str) -> DomainResult<Option<ClusterEvent>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}

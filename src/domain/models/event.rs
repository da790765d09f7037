//! Cluster event model (the core/v1 `Event` shape).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::object::ObjectRef;

/// Metadata of the event object itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub uid: String,
}

/// Series information attached to de-duplicated, recurring events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSeries {
    #[serde(default)]
    pub count: u32,
    pub last_observed_time: Option<DateTime<Utc>>,
}

/// A cluster state-change event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterEvent {
    #[serde(default)]
    pub metadata: EventMeta,
    /// `Normal` or `Warning`.
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    pub involved_object: ObjectRef,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub event_time: Option<DateTime<Utc>>,
    pub series: Option<EventSeries>,
    #[serde(default)]
    pub count: u32,
}

impl ClusterEvent {
    /// Build a minimal event, mostly for fixtures.
    pub fn new(
        event_type: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
        involved_object: ObjectRef,
    ) -> Self {
        Self {
            metadata: EventMeta {
                namespace: involved_object.namespace.clone(),
                ..EventMeta::default()
            },
            event_type: event_type.into(),
            reason: reason.into(),
            message: message.into(),
            involved_object,
            first_timestamp: None,
            last_timestamp: None,
            event_time: None,
            series: None,
            count: 1,
        }
    }

    pub fn with_last_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.last_timestamp = Some(at);
        self
    }

    pub fn with_first_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.first_timestamp = Some(at);
        self
    }

    /// Most recent observation: series time for series events, else `lastTimestamp`.
    pub fn last_observed(&self) -> Option<DateTime<Utc>> {
        self.series
            .as_ref()
            .and_then(|s| s.last_observed_time)
            .or(self.last_timestamp)
    }

    /// First observation: `firstTimestamp`, else the new-style `eventTime`.
    pub fn first_observed(&self) -> Option<DateTime<Utc>> {
        self.first_timestamp.or(self.event_time)
    }

    /// Timestamp used for the startup horizon check.
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.last_observed().or_else(|| self.first_observed())
    }

    /// Short identifier for logs.
    pub fn display_id(&self) -> String {
        if self.metadata.name.is_empty() {
            format!("{}:{}", self.involved_object, self.reason)
        } else {
            format!("{}/{}", self.metadata.namespace, self.metadata.name)
        }
    }
}

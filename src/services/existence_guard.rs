//! Object existence guard.
//!
//! Confirms that the object an event refers to is still present. Only a
//! definitive not-found drops the event; errors and timeouts fail open.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::LookupError;
use crate::domain::models::{DynamicObject, ObjectRef};
use crate::domain::ports::ObjectLookup;

/// Outcome of an existence check.
#[derive(Debug, Clone, PartialEq)]
pub enum Existence {
    /// The object exists; the fetched handle is reused by owner resolution.
    Present(Box<DynamicObject>),
    /// The object is gone; the event is stale.
    Missing,
    /// The lookup failed or timed out; treated as present.
    Unknown(LookupError),
}

impl Existence {
    pub const fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn object(&self) -> Option<&DynamicObject> {
        match self {
            Self::Present(obj) => Some(obj),
            _ => None,
        }
    }
}

/// Looks up the referenced object under a per-call deadline. Never cached.
pub struct ObjectExistenceGuard {
    lookup: Arc<dyn ObjectLookup>,
    timeout: Duration,
}

impl ObjectExistenceGuard {
    pub fn new(lookup: Arc<dyn ObjectLookup>, timeout: Duration) -> Self {
        Self { lookup, timeout }
    }

    pub async fn check(&self, object: &ObjectRef) -> Existence {
        match lookup_with_deadline(self.lookup.as_ref(), object, self.timeout).await {
            Ok(Some(found)) => Existence::Present(Box::new(found)),
            Ok(None) => Existence::Missing,
            Err(err) => {
                tracing::warn!(object = %object, error = %err, "existence check failed, proceeding");
                Existence::Unknown(err)
            }
        }
    }
}

/// Run a lookup, mapping an elapsed deadline to `LookupError::Timeout`.
pub(crate) async fn lookup_with_deadline(
    lookup: &dyn ObjectLookup,
    object: &ObjectRef,
    timeout: Duration,
) -> Result<Option<DynamicObject>, LookupError> {
    match tokio::time::timeout(timeout, lookup.get(object)).await {
        Ok(result) => result,
        Err(_) => Err(LookupError::Timeout(
            u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryObjectLookup;

    fn pod_ref() -> ObjectRef {
        ObjectRef::new("v1", "Pod", "default", "web-0")
    }

    #[tokio::test]
    async fn test_present_object() {
        let lookup = InMemoryObjectLookup::new();
        lookup.insert(DynamicObject::new("v1", "Pod", "default", "web-0")).await;
        let guard = ObjectExistenceGuard::new(Arc::new(lookup), Duration::from_secs(1));

        let result = guard.check(&pod_ref()).await;
        assert_eq!(result.object().unwrap().metadata.name, "web-0");
        assert!(!result.is_missing());
    }

    #[tokio::test]
    async fn test_missing_object_drops() {
        let guard = ObjectExistenceGuard::new(
            Arc::new(InMemoryObjectLookup::new()),
            Duration::from_secs(1),
        );
        assert!(guard.check(&pod_ref()).await.is_missing());
    }

    #[tokio::test]
    async fn test_lookup_error_fails_open() {
        let lookup = InMemoryObjectLookup::new();
        lookup
            .fail_with(LookupError::Forbidden("pods is forbidden".to_string()))
            .await;
        let guard = ObjectExistenceGuard::new(Arc::new(lookup), Duration::from_secs(1));

        let result = guard.check(&pod_ref()).await;
        assert!(matches!(result, Existence::Unknown(LookupError::Forbidden(_))));
        assert!(!result.is_missing());
    }

    #[tokio::test]
    async fn test_slow_lookup_times_out_and_fails_open() {
        let lookup = InMemoryObjectLookup::new().with_latency(Duration::from_millis(200));
        let guard = ObjectExistenceGuard::new(Arc::new(lookup), Duration::from_millis(10));

        let result = guard.check(&pod_ref()).await;
        assert_eq!(result, Existence::Unknown(LookupError::Timeout(10)));
    }
}

//! Owner resolution.
//!
//! Events are usually emitted for ephemeral objects (a pod of a deployment,
//! the pod of a cron-spawned job). Grouping by the literal object name would
//! reset rate limits and cooldowns every time the workload re-creates its
//! pods, so machine-generated names are collapsed onto their owners:
//!
//! ```text
//! Pod web-7d4b9c8f6d-q2w5z -> ReplicaSet web-7d4b9c8f6d -> Deployment web
//! Pod backup-28405760-x7k2p -> Job backup-28405760      -> CronJob backup
//! Pod worker-x7k2p          -> DaemonSet worker
//! ```
//!
//! At most two hops are taken. Any lookup failure falls back to the most
//! specific identity already known; resolution never blocks intake.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::{DynamicObject, ObjectIdentity, ObjectRef};
use crate::domain::ports::ObjectLookup;

use super::existence_guard::lookup_with_deadline;

/// Alphabet used by the API server for `generateName` and pod-template-hash suffixes.
const SAFE_SUFFIX_ALPHABET: &str = "bcdfghjklmnpqrstvwxz2456789";

/// Suffix appended to pods created through `generateName`.
const GENERATED_SUFFIX_LEN: usize = 5;

/// Accepted lengths of a pod-template-hash suffix.
const TEMPLATE_HASH_LEN: std::ops::RangeInclusive<usize> = 6..=10;

/// Accepted lengths of a cron job's scheduled-time suffix (minutes since epoch).
const SCHEDULE_SUFFIX_LEN: std::ops::RangeInclusive<usize> = 8..=10;

fn last_segment(name: &str) -> Option<&str> {
    let (base, suffix) = name.rsplit_once('-')?;
    (!base.is_empty()).then_some(suffix)
}

fn is_safe_encoded(s: &str) -> bool {
    s.chars().all(|c| SAFE_SUFFIX_ALPHABET.contains(c))
}

/// `web-x7k2p`: a `generateName` suffix.
pub fn looks_generated(name: &str) -> bool {
    last_segment(name).is_some_and(|s| s.len() == GENERATED_SUFFIX_LEN && is_safe_encoded(s))
}

/// `web-7d4b9c8f6d` or `backup-28405760`: an instance spawned by a
/// higher-level controller, named after it plus a hash or schedule suffix.
pub fn looks_like_instance(name: &str) -> bool {
    last_segment(name).is_some_and(|s| {
        (TEMPLATE_HASH_LEN.contains(&s.len()) && is_safe_encoded(s))
            || (SCHEDULE_SUFFIX_LEN.contains(&s.len()) && s.chars().all(|c| c.is_ascii_digit()))
    })
}

/// Walks owner references to a stable grouping identity.
pub struct OwnerResolver {
    lookup: Arc<dyn ObjectLookup>,
    timeout: Duration,
}

impl OwnerResolver {
    pub fn new(lookup: Arc<dyn ObjectLookup>, timeout: Duration) -> Self {
        Self { lookup, timeout }
    }

    /// Resolve the identity events about `object` are grouped under.
    ///
    /// `prefetched` is the object as returned by the existence check, which
    /// saves the first lookup when present.
    pub async fn resolve(&self, object: &ObjectRef, prefetched: Option<&DynamicObject>) -> ObjectIdentity {
        let literal = ObjectIdentity::from(object);
        if !looks_generated(&object.name) {
            return literal;
        }

        let fetched;
        let current = match prefetched {
            Some(obj) => obj,
            None => match self.fetch(object).await {
                Some(obj) => {
                    fetched = obj;
                    &fetched
                }
                None => return literal,
            },
        };

        let Some(owner) = current.controller_owner() else {
            return literal;
        };
        let owner_ref = current.owner_ref(owner);
        let owner_identity = ObjectIdentity::from(&owner_ref);

        if !looks_like_instance(&owner_ref.name) {
            return owner_identity;
        }

        // One more hop: the instance's own controller (Deployment, CronJob).
        let Some(owner_obj) = self.fetch(&owner_ref).await else {
            return owner_identity;
        };
        match owner_obj.controller_owner() {
            Some(grand) => ObjectIdentity::from(&owner_obj.owner_ref(grand)),
            None => owner_identity,
        }
    }

    async fn fetch(&self, object: &ObjectRef) -> Option<DynamicObject> {
        match lookup_with_deadline(self.lookup.as_ref(), object, self.timeout).await {
            Ok(found) => found,
            Err(err) => {
                tracing::debug!(object = %object, error = %err, "owner lookup failed, using literal identity");
                None
            }
        }
    }
}

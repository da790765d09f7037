//! In-memory suppress-until timestamps.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::domain::models::SuppressionKey;

/// Per-key cooldowns. An entry whose timestamp has passed is treated as absent.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    entries: Mutex<HashMap<SuppressionKey, DateTime<Utc>>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SuppressionKey, DateTime<Utc>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_in_cooldown(&self, key: &SuppressionKey, now: DateTime<Utc>) -> bool {
        self.suppressed_until(key, now).is_some()
    }

    /// The active suppress-until timestamp for `key`, if any.
    pub fn suppressed_until(&self, key: &SuppressionKey, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.lock().get(key).copied().filter(|until| now < *until)
    }

    /// Suppress `key` until `now + duration` and return that instant.
    pub fn set_cooldown(&self, key: &SuppressionKey, now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
        let until = now + duration;
        self.lock().insert(key.clone(), until);
        until
    }

    /// Seed entries loaded from durable storage.
    ///
    /// A restored entry never shortens a cooldown already set in this process.
    pub fn restore(&self, entries: HashMap<SuppressionKey, DateTime<Utc>>) -> usize {
        let mut map = self.lock();
        let mut restored = 0;
        for (key, until) in entries {
            let slot = map.entry(key).or_insert(until);
            if *slot < until {
                *slot = until;
            }
            restored += 1;
        }
        restored
    }

    /// Copy of every entry still active at `now`.
    pub fn snapshot(&self, now: DateTime<Utc>) -> HashMap<SuppressionKey, DateTime<Utc>> {
        self.lock()
            .iter()
            .filter(|(_, until)| now < **until)
            .map(|(k, until)| (k.clone(), *until))
            .collect()
    }

    /// Remove entries that expired at or before `now`.
    pub fn prune_expired(&self, now: DateTime<Utc>) -> usize {
        let mut map = self.lock();
        let before = map.len();
        map.retain(|_, until| now < *until);
        before - map.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ObjectIdentity, PolicyRef};

    fn key(name: &str) -> SuppressionKey {
        SuppressionKey::new(
            PolicyRef::new("ops", "p"),
            ObjectIdentity::new("default", "Deployment", name),
            "BackOff",
        )
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_cooldown_window() {
        let tracker = CooldownTracker::new();
        let k = key("web");
        let now = t0();

        assert!(!tracker.is_in_cooldown(&k, now));
        tracker.set_cooldown(&k, now, Duration::minutes(5));
        assert!(tracker.is_in_cooldown(&k, now + Duration::minutes(4)));
        assert!(!tracker.is_in_cooldown(&k, now + Duration::minutes(6)));
        // Expiry is exclusive of the boundary instant.
        assert!(!tracker.is_in_cooldown(&k, now + Duration::minutes(5)));
    }

    #[test]
    fn test_set_overwrites() {
        let tracker = CooldownTracker::new();
        let k = key("web");
        let now = t0();
        tracker.set_cooldown(&k, now, Duration::hours(2));
        let until = tracker.set_cooldown(&k, now, Duration::minutes(1));
        assert_eq!(tracker.suppressed_until(&k, now), Some(until));
    }

    #[test]
    fn test_restore_keeps_longer_cooldown() {
        let tracker = CooldownTracker::new();
        let now = t0();
        let live = tracker.set_cooldown(&key("web"), now, Duration::hours(3));

        let mut loaded = HashMap::new();
        loaded.insert(key("web"), now + Duration::hours(1));
        loaded.insert(key("api"), now + Duration::hours(1));
        assert_eq!(tracker.restore(loaded), 2);

        assert_eq!(tracker.suppressed_until(&key("web"), now), Some(live));
        assert!(tracker.is_in_cooldown(&key("api"), now));
    }

    #[test]
    fn test_snapshot_and_prune_skip_expired() {
        let tracker = CooldownTracker::new();
        let now = t0();
        tracker.set_cooldown(&key("a"), now, Duration::minutes(1));
        tracker.set_cooldown(&key("b"), now, Duration::hours(1));

        let later = now + Duration::minutes(2);
        let snap = tracker.snapshot(later);
        assert_eq!(snap.len(), 1);
        assert!(snap.contains_key(&key("b")));

        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.prune_expired(later), 1);
        assert_eq!(tracker.len(), 1);
    }
}

//! Durable, policy-scoped backing store for long cooldowns.
//!
//! Only cooldowns that outlive the minimum persistence threshold are worth
//! a write; shorter ones are simply lost on restart. Changed keys are
//! tracked in a dirty set and flushed per policy by [`CooldownPersistence::sync`],
//! driven by the background flusher. Every record is a full snapshot of the
//! policy's qualifying cooldowns, so a successful write also removes entries
//! that have since expired.
//!
//! Failures never reach the admission path: reads skip the offending record,
//! writes leave their keys dirty for the next cycle.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::domain::errors::StoreError;
use crate::domain::models::{record_name, CooldownStateRecord, PolicyRef, RemediationPolicy, SuppressionKey};
use crate::domain::ports::{Clock, CooldownRecordStore, PolicySource};

// ----------------------------------------------------------------------------
// Stats
// ----------------------------------------------------------------------------

/// Persistence outcome counters.
#[derive(Debug, Default)]
pub struct PersistenceStats {
    flushes_succeeded: AtomicU64,
    flushes_failed: AtomicU64,
    records_loaded: AtomicU64,
    records_skipped: AtomicU64,
    entries_restored: AtomicU64,
    below_threshold: AtomicU64,
    orphans_collected: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PersistenceStatsSnapshot {
    pub flushes_succeeded: u64,
    pub flushes_failed: u64,
    pub records_loaded: u64,
    pub records_skipped: u64,
    pub entries_restored: u64,
    pub below_threshold: u64,
    pub orphans_collected: u64,
}

impl PersistenceStats {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PersistenceStatsSnapshot {
        PersistenceStatsSnapshot {
            flushes_succeeded: self.flushes_succeeded.load(Ordering::Relaxed),
            flushes_failed: self.flushes_failed.load(Ordering::Relaxed),
            records_loaded: self.records_loaded.load(Ordering::Relaxed),
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
            entries_restored: self.entries_restored.load(Ordering::Relaxed),
            below_threshold: self.below_threshold.load(Ordering::Relaxed),
            orphans_collected: self.orphans_collected.load(Ordering::Relaxed),
        }
    }
}

// ----------------------------------------------------------------------------
// Sync results
// ----------------------------------------------------------------------------

/// What one sync cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Policies whose record was created or replaced.
    pub written: Vec<PolicyRef>,
    /// Policies whose dirty keys were dropped without a write (deleted,
    /// persistence turned off, or nothing left to store).
    pub discarded: Vec<PolicyRef>,
    /// Dirty keys cleared by this cycle.
    pub keys_cleared: usize,
}

/// A policy whose record could not be written this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicySyncFailure {
    pub policy: PolicyRef,
    pub error: StoreError,
}

/// Some policies failed to sync; the rest of the cycle still completed.
#[derive(Debug, Clone, Error)]
#[error("{} policies failed to sync", .failures.len())]
pub struct SyncError {
    pub report: SyncReport,
    pub failures: Vec<PolicySyncFailure>,
}

// ----------------------------------------------------------------------------
// Dirty set
// ----------------------------------------------------------------------------

/// The latest change to a dirty key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DirtyMark {
    generation: u64,
    suppress_until: DateTime<Utc>,
}

/// Keys changed since their last successful write, each stamped with the
/// generation and value of its latest change.
#[derive(Debug, Default)]
struct DirtySet {
    generation: u64,
    keys: HashMap<SuppressionKey, DirtyMark>,
}

impl DirtySet {
    fn mark(&mut self, key: SuppressionKey, suppress_until: DateTime<Utc>) {
        self.generation += 1;
        self.keys.insert(
            key,
            DirtyMark {
                generation: self.generation,
                suppress_until,
            },
        );
    }

    /// Clear `key` unless it was marked again after `seen`.
    fn clear_if_unchanged(&mut self, key: &SuppressionKey, seen: u64) -> bool {
        if self.keys.get(key).is_some_and(|mark| mark.generation == seen) {
            self.keys.remove(key);
            true
        } else {
            false
        }
    }
}

// ----------------------------------------------------------------------------
// CooldownPersistence
// ----------------------------------------------------------------------------

pub struct CooldownPersistence {
    store: Arc<dyn CooldownRecordStore>,
    policies: Arc<dyn PolicySource>,
    clock: Arc<dyn Clock>,
    min_persist: chrono::Duration,
    io_timeout: Duration,
    dirty: Mutex<DirtySet>,
    /// Serializes sync cycles so there is a single writer.
    writer: tokio::sync::Mutex<()>,
    stats: PersistenceStats,
}

impl CooldownPersistence {
    pub fn new(
        store: Arc<dyn CooldownRecordStore>,
        policies: Arc<dyn PolicySource>,
        clock: Arc<dyn Clock>,
        min_persist: chrono::Duration,
        io_timeout: Duration,
    ) -> Self {
        Self {
            store,
            policies,
            clock,
            min_persist,
            io_timeout,
            dirty: Mutex::new(DirtySet::default()),
            writer: tokio::sync::Mutex::new(()),
            stats: PersistenceStats::default(),
        }
    }

    pub fn stats(&self) -> &PersistenceStats {
        &self.stats
    }

    fn dirty(&self) -> MutexGuard<'_, DirtySet> {
        self.dirty.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn qualifies(&self, until: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        until - now > self.min_persist
    }

    /// Record `key` for the next flush if its cooldown outlives the
    /// persistence threshold. Returns whether it was marked.
    pub fn mark_dirty(&self, key: &SuppressionKey, suppress_until: DateTime<Utc>) -> bool {
        if !self.qualifies(suppress_until, self.clock.now()) {
            PersistenceStats::bump(&self.stats.below_threshold, 1);
            return false;
        }
        self.dirty().mark(key.clone(), suppress_until);
        true
    }

    pub fn is_dirty(&self, key: &SuppressionKey) -> bool {
        self.dirty().keys.contains_key(key)
    }

    pub fn dirty_len(&self) -> usize {
        self.dirty().keys.len()
    }

    async fn with_deadline<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.io_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(
                u64::try_from(self.io_timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }

    // ------------------------------------------------------------------------
    // Load
    // ------------------------------------------------------------------------

    /// Read back every persistence-enabled policy's record, dropping entries
    /// that have already expired. Unreadable records are skipped.
    #[tracing::instrument(skip(self))]
    pub async fn load(&self) -> HashMap<SuppressionKey, DateTime<Utc>> {
        let now = self.clock.now();
        let mut restored = HashMap::new();

        for policy in self.policies.list().await {
            if !policy.persistence_enabled() {
                continue;
            }
            let policy_ref = policy.policy_ref();
            let name = record_name(&policy.metadata.name);

            let record = match self.with_deadline(self.store.get(&policy_ref.namespace, &name)).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(policy = %policy_ref, error = %e, "failed to read cooldown record, skipping");
                    PersistenceStats::bump(&self.stats.records_skipped, 1);
                    continue;
                }
            };

            match record.decode(&policy_ref, now) {
                Ok(entries) => {
                    tracing::debug!(policy = %policy_ref, entries = entries.len(), "loaded cooldown record");
                    PersistenceStats::bump(&self.stats.records_loaded, 1);
                    PersistenceStats::bump(&self.stats.entries_restored, entries.len() as u64);
                    restored.extend(entries);
                }
                Err(e) => {
                    tracing::warn!(policy = %policy_ref, error = %e, "ignoring cooldown record");
                    PersistenceStats::bump(&self.stats.records_skipped, 1);
                }
            }
        }

        tracing::info!(entries = restored.len(), "cooldown state loaded");
        restored
    }

    // ------------------------------------------------------------------------
    // Sync
    // ------------------------------------------------------------------------

    /// Flush every policy with at least one dirty key.
    ///
    /// `snapshot` is the tracker's current state; entries are re-filtered
    /// against the persistence threshold. A dirty key is cleared only once the
    /// written record carries its latest value or the value no longer
    /// qualifies, so keys marked after `snapshot` was taken stay dirty. A
    /// failing policy does not stop the others; its keys stay dirty and are
    /// retried next cycle.
    #[tracing::instrument(skip(self, snapshot), fields(entries = snapshot.len()))]
    pub async fn sync(&self, snapshot: &HashMap<SuppressionKey, DateTime<Utc>>) -> Result<SyncReport, SyncError> {
        let _writer = self.writer.lock().await;
        let now = self.clock.now();

        let mut pending: HashMap<PolicyRef, Vec<(SuppressionKey, DirtyMark)>> = HashMap::new();
        for (key, mark) in self.dirty().keys.iter() {
            pending.entry(key.policy.clone()).or_default().push((key.clone(), *mark));
        }

        let mut report = SyncReport::default();
        let mut failures = Vec::new();

        let mut policy_refs: Vec<_> = pending.keys().cloned().collect();
        policy_refs.sort();

        for policy_ref in policy_refs {
            let captured = pending.remove(&policy_ref).unwrap_or_default();

            let policy = match self.policies.get(&policy_ref.namespace, &policy_ref.name).await {
                Some(p) if p.persistence_enabled() => p,
                Some(_) => {
                    tracing::debug!(policy = %policy_ref, "persistence disabled, discarding dirty keys");
                    report.keys_cleared += self.clear(&captured);
                    report.discarded.push(policy_ref);
                    continue;
                }
                None => {
                    tracing::debug!(policy = %policy_ref, "policy deleted, discarding dirty keys");
                    report.keys_cleared += self.clear(&captured);
                    report.discarded.push(policy_ref);
                    continue;
                }
            };

            let entries: HashMap<SuppressionKey, DateTime<Utc>> = snapshot
                .iter()
                .filter(|(key, until)| key.policy == policy_ref && self.qualifies(**until, now))
                .map(|(k, v)| (k.clone(), *v))
                .collect();

            // A key marked after the snapshot was taken is not covered by
            // this write and stays dirty for the next cycle.
            let (settled, uncovered): (Vec<_>, Vec<_>) = captured.into_iter().partition(|(key, mark)| {
                !self.qualifies(mark.suppress_until, now)
                    || entries.get(key).is_some_and(|until| *until >= mark.suppress_until)
            });
            if !uncovered.is_empty() {
                tracing::debug!(policy = %policy_ref, keys = uncovered.len(), "dirty keys newer than snapshot, kept");
            }

            match self.write_record(&policy, &entries, now).await {
                Ok(true) => {
                    tracing::debug!(policy = %policy_ref, entries = entries.len(), "cooldown record written");
                    PersistenceStats::bump(&self.stats.flushes_succeeded, 1);
                    report.keys_cleared += self.clear(&settled);
                    report.written.push(policy_ref);
                }
                Ok(false) => {
                    report.keys_cleared += self.clear(&settled);
                    if uncovered.is_empty() {
                        report.discarded.push(policy_ref);
                    }
                }
                Err(error) => {
                    tracing::warn!(policy = %policy_ref, error = %error, "cooldown flush failed, will retry");
                    PersistenceStats::bump(&self.stats.flushes_failed, 1);
                    failures.push(PolicySyncFailure {
                        policy: policy_ref,
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(SyncError { report, failures })
        }
    }

    fn clear(&self, captured: &[(SuppressionKey, DirtyMark)]) -> usize {
        let mut dirty = self.dirty();
        captured
            .iter()
            .filter(|(key, mark)| dirty.clear_if_unchanged(key, mark.generation))
            .count()
    }

    /// Create or replace the policy's record. Returns `false` when there was
    /// nothing to store and no record to update.
    async fn write_record(
        &self,
        policy: &RemediationPolicy,
        entries: &HashMap<SuppressionKey, DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let record = CooldownStateRecord::encode(policy, entries, now)?;
        let namespace = &record.metadata.namespace;
        let name = &record.metadata.name;

        let existing = self.with_deadline(self.store.get(namespace, name)).await?;
        if existing.is_some() {
            match self.with_deadline(self.store.replace(&record)).await {
                Err(StoreError::NotFound { .. }) => {}
                other => return other.map(|()| true),
            }
        }
        // Deleted underneath us, or never written: nothing to create.
        if entries.is_empty() {
            return Ok(false);
        }

        match self.with_deadline(self.store.create(&record)).await {
            Err(StoreError::AlreadyExists { .. }) => {
                self.with_deadline(self.store.replace(&record)).await?;
                Ok(true)
            }
            other => other.map(|()| true),
        }
    }

    // ------------------------------------------------------------------------
    // Orphans
    // ------------------------------------------------------------------------

    /// Delete managed records whose owning policy no longer exists.
    #[tracing::instrument(skip(self))]
    pub async fn collect_orphans(&self) -> Result<usize, StoreError> {
        let live: HashSet<String> = self
            .policies
            .list()
            .await
            .into_iter()
            .map(|p| p.metadata.uid.to_string())
            .collect();

        let records = self.with_deadline(self.store.list(None)).await?;
        let mut deleted = 0;
        for record in records.iter().filter(|r| r.is_managed()) {
            let orphaned = record.owner_uid().is_none_or(|uid| !live.contains(uid));
            if !orphaned {
                continue;
            }
            let (namespace, name) = (&record.metadata.namespace, &record.metadata.name);
            match self.with_deadline(self.store.delete(namespace, name)).await {
                Ok(()) => {
                    tracing::info!(record = %format!("{namespace}/{name}"), "deleted orphaned cooldown record");
                    deleted += 1;
                }
                Err(e) => tracing::warn!(record = %format!("{namespace}/{name}"), error = %e, "failed to delete orphaned record"),
            }
        }
        PersistenceStats::bump(&self.stats.orphans_collected, deleted as u64);
        Ok(deleted)
    }
}

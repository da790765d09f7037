//! Intake orchestration: the per-event admit/drop decision.
//!
//! ```text
//! event -> horizon -> existence -> selectors -> owner -> [cooldown? rate? admit] (atomic)
//! ```
//!
//! Event-level drops (historical, deleted object, no governing policy) are
//! reported once. Otherwise every governing policy gets its own decision;
//! the object lookup and owner resolution are shared between them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::cooldown_persistence::CooldownPersistence;
use super::cooldown_tracker::CooldownTracker;
use super::existence_guard::{Existence, ObjectExistenceGuard};
use super::horizon_filter::StartupHorizonFilter;
use super::owner_resolver::OwnerResolver;
use super::persistence_flusher::SnapshotFn;
use super::rate_limiter::RateLimiter;
use super::selector_matcher::{CompiledPolicy, EffectiveSettings, SelectorMatch, SelectorMatcher};
use crate::domain::models::{
    ClusterEvent, CooldownStart, IntakeConfig, ObjectIdentity, ObjectRef, PolicyRef, RemediationPolicy,
    SuppressionKey,
};
use crate::domain::ports::{Clock, ObjectLookup};

// ----------------------------------------------------------------------------
// Decisions
// ----------------------------------------------------------------------------

/// An admitted event, handed to remediation dispatch and notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admission {
    pub key: SuppressionKey,
    pub involved_object: ObjectRef,
    pub selector_index: usize,
    pub settings: EffectiveSettings,
    pub admitted_at: DateTime<Utc>,
    pub cooldown_minutes: u32,
    /// Set when the cooldown started at admission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_until: Option<DateTime<Utc>>,
    pub event: ClusterEvent,
    #[serde(skip)]
    persist: bool,
}

/// Verdict of one governing policy.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyDecision {
    Admitted(Box<Admission>),
    RateLimited { key: SuppressionKey },
    InCooldown { key: SuppressionKey, until: DateTime<Utc> },
}

impl PolicyDecision {
    pub fn key(&self) -> &SuppressionKey {
        match self {
            Self::Admitted(admission) => &admission.key,
            Self::RateLimited { key } | Self::InCooldown { key, .. } => key,
        }
    }

    pub fn admission(&self) -> Option<&Admission> {
        match self {
            Self::Admitted(admission) => Some(admission),
            _ => None,
        }
    }
}

/// Result of running one event through intake.
#[derive(Debug, Clone, PartialEq)]
pub enum IntakeOutcome {
    /// Observed before this process started.
    DroppedHistorical,
    /// The involved object no longer exists.
    DroppedDeletedObject,
    /// No policy selector matched.
    NoMatch,
    /// One decision per governing policy, in policy order.
    Evaluated(Vec<PolicyDecision>),
}

impl IntakeOutcome {
    pub fn decisions(&self) -> &[PolicyDecision] {
        match self {
            Self::Evaluated(decisions) => decisions,
            _ => &[],
        }
    }

    pub fn admissions(&self) -> impl Iterator<Item = &Admission> {
        self.decisions().iter().filter_map(PolicyDecision::admission)
    }

    pub fn is_admitted(&self) -> bool {
        self.admissions().next().is_some()
    }
}

// ----------------------------------------------------------------------------
// Stats
// ----------------------------------------------------------------------------

/// Intake outcome counters.
#[derive(Debug, Default)]
pub struct IntakeStats {
    received: AtomicU64,
    dropped_historical: AtomicU64,
    dropped_deleted_object: AtomicU64,
    no_selector_match: AtomicU64,
    rate_limited: AtomicU64,
    in_cooldown: AtomicU64,
    admitted: AtomicU64,
    lookup_fail_open: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IntakeStatsSnapshot {
    pub received: u64,
    pub dropped_historical: u64,
    pub dropped_deleted_object: u64,
    pub no_selector_match: u64,
    pub rate_limited: u64,
    pub in_cooldown: u64,
    pub admitted: u64,
    pub lookup_fail_open: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl IntakeStats {
    pub fn snapshot(&self) -> IntakeStatsSnapshot {
        IntakeStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            dropped_historical: self.dropped_historical.load(Ordering::Relaxed),
            dropped_deleted_object: self.dropped_deleted_object.load(Ordering::Relaxed),
            no_selector_match: self.no_selector_match.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            in_cooldown: self.in_cooldown.load(Ordering::Relaxed),
            admitted: self.admitted.load(Ordering::Relaxed),
            lookup_fail_open: self.lookup_fail_open.load(Ordering::Relaxed),
        }
    }
}

// ----------------------------------------------------------------------------
// Orchestrator
// ----------------------------------------------------------------------------

pub struct IntakeOrchestrator {
    clock: Arc<dyn Clock>,
    horizon: StartupHorizonFilter,
    existence: ObjectExistenceGuard,
    owners: OwnerResolver,
    matcher: RwLock<Arc<SelectorMatcher>>,
    limiter: RateLimiter,
    cooldowns: CooldownTracker,
    persistence: Option<Arc<CooldownPersistence>>,
    cooldown_start: CooldownStart,
    /// Held for the combined cooldown / rate-limit / admit step.
    admission: Mutex<()>,
    stats: IntakeStats,
}

impl IntakeOrchestrator {
    /// Build an orchestrator whose startup horizon is the clock's current time.
    pub fn new(
        policies: &[RemediationPolicy],
        lookup: Arc<dyn ObjectLookup>,
        clock: Arc<dyn Clock>,
        config: &IntakeConfig,
    ) -> Self {
        let started_at = clock.now();
        Self {
            horizon: StartupHorizonFilter::new(started_at),
            existence: ObjectExistenceGuard::new(lookup.clone(), config.lookup_timeout()),
            owners: OwnerResolver::new(lookup, config.lookup_timeout()),
            matcher: RwLock::new(Arc::new(SelectorMatcher::compile(policies))),
            limiter: RateLimiter::new(),
            cooldowns: CooldownTracker::new(),
            persistence: None,
            cooldown_start: config.cooldown_start,
            admission: Mutex::new(()),
            stats: IntakeStats::default(),
            clock,
        }
    }

    pub fn with_persistence(mut self, persistence: Arc<CooldownPersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.horizon = StartupHorizonFilter::new(started_at);
        self
    }

    pub fn stats(&self) -> &IntakeStats {
        &self.stats
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.horizon.started_at()
    }

    /// Swap in a new policy set. In-flight evaluations finish on the old one.
    pub fn reload_policies(&self, policies: &[RemediationPolicy]) {
        let compiled = Arc::new(SelectorMatcher::compile(policies));
        *self.matcher.write().unwrap_or_else(PoisonError::into_inner) = compiled;
    }

    fn matcher(&self) -> Arc<SelectorMatcher> {
        self.matcher.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Run one event through intake.
    #[tracing::instrument(skip(self, event), fields(event = %event.display_id(), reason = %event.reason))]
    pub async fn evaluate(&self, event: &ClusterEvent) -> IntakeOutcome {
        bump(&self.stats.received);

        if self.horizon.is_historical(event) {
            tracing::debug!("dropped: observed before startup");
            bump(&self.stats.dropped_historical);
            return IntakeOutcome::DroppedHistorical;
        }

        let object = &event.involved_object;
        let existence = self.existence.check(object).await;
        match existence {
            Existence::Missing => {
                tracing::debug!(object = %object, "dropped: involved object deleted");
                bump(&self.stats.dropped_deleted_object);
                return IntakeOutcome::DroppedDeletedObject;
            }
            Existence::Unknown(_) => bump(&self.stats.lookup_fail_open),
            Existence::Present(_) => {}
        }

        let matcher = self.matcher();
        let matched: Vec<(&CompiledPolicy, SelectorMatch)> = matcher.matches(event).collect();
        if matched.is_empty() {
            tracing::debug!("dropped: no selector match");
            bump(&self.stats.no_selector_match);
            return IntakeOutcome::NoMatch;
        }

        let identity = match existence.object() {
            Some(found) => self.owners.resolve(object, Some(found)).await,
            // The lookup just failed; another attempt would only add latency.
            None => ObjectIdentity::from(object),
        };

        let decisions = matched
            .into_iter()
            .map(|(policy, selector)| self.decide(policy, selector, &identity, event))
            .collect();
        IntakeOutcome::Evaluated(decisions)
    }

    fn decide(
        &self,
        policy: &CompiledPolicy,
        selector: SelectorMatch,
        identity: &ObjectIdentity,
        event: &ClusterEvent,
    ) -> PolicyDecision {
        let spec = &policy.policy().spec;
        let key = SuppressionKey::new(policy.policy().policy_ref(), identity.clone(), event.reason.clone());
        let persist = policy.policy().persistence_enabled();

        let _admission = self.admission.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();

        if let Some(until) = self.cooldowns.suppressed_until(&key, now) {
            tracing::debug!(key = %key, until = %until, "suppressed: in cooldown");
            bump(&self.stats.in_cooldown);
            return PolicyDecision::InCooldown { key, until };
        }

        if !self
            .limiter
            .check_and_record(&key, spec.rate_limit.events_per_minute, now)
            .is_allow()
        {
            tracing::debug!(key = %key, limit = spec.rate_limit.events_per_minute, "suppressed: rate limited");
            bump(&self.stats.rate_limited);
            return PolicyDecision::RateLimited { key };
        }

        let cooldown_until = match self.cooldown_start {
            CooldownStart::Admission => Some(self.start_cooldown(&key, now, spec.rate_limit.cooldown(), persist)),
            CooldownStart::Completion => None,
        };

        tracing::info!(
            key = %key,
            selector = selector.selector_index,
            mode = ?selector.settings.mode,
            risk = ?selector.settings.risk,
            "event admitted"
        );
        bump(&self.stats.admitted);

        PolicyDecision::Admitted(Box::new(Admission {
            key,
            involved_object: event.involved_object.clone(),
            selector_index: selector.selector_index,
            settings: selector.settings,
            admitted_at: now,
            cooldown_minutes: spec.rate_limit.cooldown_minutes,
            cooldown_until,
            event: event.clone(),
            persist,
        }))
    }

    /// Set the cooldown and queue it for persistence. Caller holds the admission lock.
    fn start_cooldown(
        &self,
        key: &SuppressionKey,
        now: DateTime<Utc>,
        duration: chrono::Duration,
        persist: bool,
    ) -> DateTime<Utc> {
        let until = self.cooldowns.set_cooldown(key, now, duration);
        if persist {
            if let Some(persistence) = &self.persistence {
                persistence.mark_dirty(key, until);
            }
        }
        until
    }

    /// Downstream processing of `admission` finished; start its cooldown.
    ///
    /// With admission-time cooldowns this is a no-op returning the cooldown
    /// already set.
    pub fn confirm_dispatch(&self, admission: &Admission) -> DateTime<Utc> {
        if let Some(until) = admission.cooldown_until {
            return until;
        }
        let _admission = self.admission.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now();
        let duration = chrono::Duration::minutes(i64::from(admission.cooldown_minutes));
        let until = self.start_cooldown(&admission.key, now, duration, admission.persist);
        tracing::debug!(key = %admission.key, until = %until, "cooldown started");
        until
    }

    pub fn is_in_cooldown(&self, key: &SuppressionKey) -> bool {
        self.cooldowns.is_in_cooldown(key, self.clock.now())
    }

    /// Seed cooldowns loaded from persistence. Call before intake starts.
    pub fn restore_cooldowns(&self, entries: HashMap<SuppressionKey, DateTime<Utc>>) -> usize {
        let restored = self.cooldowns.restore(entries);
        tracing::info!(restored, "cooldowns restored");
        restored
    }

    /// Prune expired state and return the active cooldowns.
    pub fn cooldown_snapshot(&self) -> HashMap<SuppressionKey, DateTime<Utc>> {
        let now = self.clock.now();
        let expired = self.cooldowns.prune_expired(now);
        let idle = self.limiter.prune_idle(now);
        if expired > 0 || idle > 0 {
            tracing::trace!(expired, idle, "pruned intake state");
        }
        self.cooldowns.snapshot(now)
    }

    /// Snapshot accessor for the persistence flusher.
    pub fn snapshot_fn(self: &Arc<Self>) -> SnapshotFn {
        let this = Arc::clone(self);
        Arc::new(move || this.cooldown_snapshot())
    }

    pub fn policies(&self) -> Vec<PolicyRef> {
        self.matcher()
            .policies()
            .iter()
            .map(|p| p.policy().policy_ref())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryObjectLookup;
    use crate::domain::errors::LookupError;
    use crate::domain::models::{DynamicObject, EventSelector};
    use crate::infrastructure::clock::ManualClock;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn wildcard(name: &str, epm: u32, cooldown: u32) -> RemediationPolicy {
        RemediationPolicy::new("ops", name)
            .with_selector(EventSelector::default())
            .with_rate_limit(epm, cooldown)
    }

    fn web_event(at: DateTime<Utc>) -> ClusterEvent {
        ClusterEvent::new("Warning", "BackOff", "restarting", ObjectRef::new("v1", "Pod", "default", "web-0"))
            .with_last_timestamp(at)
    }

    fn orchestrator(
        policies: &[RemediationPolicy],
        lookup: InMemoryObjectLookup,
        clock: &ManualClock,
        cooldown_start: CooldownStart,
    ) -> IntakeOrchestrator {
        let config = IntakeConfig {
            cooldown_start,
            lookup_timeout_ms: 200,
            ..IntakeConfig::default()
        };
        IntakeOrchestrator::new(policies, Arc::new(lookup), Arc::new(clock.clone()), &config)
    }

    fn inventory() -> InMemoryObjectLookup {
        InMemoryObjectLookup::from_objects([DynamicObject::new("v1", "Pod", "default", "web-0")])
    }

    #[tokio::test]
    async fn test_historical_event_dropped() {
        let clock = ManualClock::new(t0());
        let intake = orchestrator(&[wildcard("p", 5, 10)], inventory(), &clock, CooldownStart::Completion);
        let outcome = intake.evaluate(&web_event(t0() - chrono::Duration::seconds(1))).await;
        assert_eq!(outcome, IntakeOutcome::DroppedHistorical);
        assert_eq!(intake.stats().snapshot().dropped_historical, 1);
    }

    #[tokio::test]
    async fn test_deleted_object_dropped_but_lookup_error_proceeds() {
        let clock = ManualClock::new(t0());
        let lookup = InMemoryObjectLookup::new();
        let intake = orchestrator(&[wildcard("p", 5, 10)], lookup.clone(), &clock, CooldownStart::Completion);

        let outcome = intake.evaluate(&web_event(t0())).await;
        assert_eq!(outcome, IntakeOutcome::DroppedDeletedObject);

        lookup.fail_with(LookupError::Forbidden("rbac".into())).await;
        let outcome = intake.evaluate(&web_event(t0())).await;
        assert!(outcome.is_admitted());
        assert_eq!(intake.stats().snapshot().lookup_fail_open, 1);
    }

    #[tokio::test]
    async fn test_no_match() {
        let clock = ManualClock::new(t0());
        let policy = RemediationPolicy::new("ops", "p").with_selector(EventSelector {
            reason: "OOMKilled".into(),
            ..EventSelector::default()
        });
        let intake = orchestrator(&[policy], inventory(), &clock, CooldownStart::Completion);
        assert_eq!(intake.evaluate(&web_event(t0())).await, IntakeOutcome::NoMatch);
    }

    #[tokio::test]
    async fn test_rate_limit_before_cooldown() {
        let clock = ManualClock::new(t0());
        let intake = orchestrator(&[wildcard("p", 2, 10)], inventory(), &clock, CooldownStart::Completion);

        let mut verdicts = Vec::new();
        for i in 0..3 {
            clock.advance(chrono::Duration::seconds(i));
            let outcome = intake.evaluate(&web_event(clock.now())).await;
            verdicts.push(outcome.decisions()[0].clone());
        }
        assert!(matches!(verdicts[0], PolicyDecision::Admitted(_)));
        assert!(matches!(verdicts[1], PolicyDecision::Admitted(_)));
        assert!(matches!(verdicts[2], PolicyDecision::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_confirm_dispatch_starts_cooldown() {
        let clock = ManualClock::new(t0());
        let intake = orchestrator(&[wildcard("p", 5, 10)], inventory(), &clock, CooldownStart::Completion);

        let outcome = intake.evaluate(&web_event(t0())).await;
        let admission = outcome.admissions().next().unwrap().clone();
        assert!(admission.cooldown_until.is_none());
        let until = intake.confirm_dispatch(&admission);
        assert_eq!(until, t0() + chrono::Duration::minutes(10));

        let outcome = intake.evaluate(&web_event(t0())).await;
        assert!(matches!(outcome.decisions()[0], PolicyDecision::InCooldown { .. }));

        clock.advance(chrono::Duration::minutes(11));
        assert!(intake.evaluate(&web_event(clock.now())).await.is_admitted());
    }

    #[tokio::test]
    async fn test_admission_mode_sets_cooldown_immediately() {
        let clock = ManualClock::new(t0());
        let intake = orchestrator(&[wildcard("p", 5, 10)], inventory(), &clock, CooldownStart::Admission);

        let first = intake.evaluate(&web_event(t0())).await;
        let admission = first.admissions().next().unwrap().clone();
        assert_eq!(admission.cooldown_until, Some(t0() + chrono::Duration::minutes(10)));
        assert!(intake.is_in_cooldown(&admission.key));

        let second = intake.evaluate(&web_event(t0())).await;
        assert!(matches!(second.decisions()[0], PolicyDecision::InCooldown { .. }));
        // The suppressed event did not consume rate budget.
        assert_eq!(intake.limiter.admissions_in_window(&admission.key, t0()), 1);
    }

    #[tokio::test]
    async fn test_policies_decide_independently() {
        let clock = ManualClock::new(t0());
        let intake = orchestrator(
            &[wildcard("a", 1, 10), wildcard("b", 5, 10)],
            inventory(),
            &clock,
            CooldownStart::Completion,
        );
        intake.evaluate(&web_event(t0())).await;
        let outcome = intake.evaluate(&web_event(t0())).await;
        let decisions = outcome.decisions();
        assert_eq!(decisions.len(), 2);
        assert!(matches!(decisions[0], PolicyDecision::RateLimited { .. }));
        assert!(matches!(decisions[1], PolicyDecision::Admitted(_)));
    }

    #[tokio::test]
    async fn test_reload_policies() {
        let clock = ManualClock::new(t0());
        let intake = orchestrator(&[], inventory(), &clock, CooldownStart::Completion);
        assert_eq!(intake.evaluate(&web_event(t0())).await, IntakeOutcome::NoMatch);

        intake.reload_policies(&[wildcard("p", 5, 10)]);
        assert!(intake.evaluate(&web_event(t0())).await.is_admitted());
        assert_eq!(intake.policies(), vec![PolicyRef::new("ops", "p")]);
    }

    #[tokio::test]
    async fn test_snapshot_prunes_expired() {
        let clock = ManualClock::new(t0());
        let intake = orchestrator(&[wildcard("p", 5, 1)], inventory(), &clock, CooldownStart::Admission);
        intake.evaluate(&web_event(t0())).await;
        assert_eq!(intake.cooldown_snapshot().len(), 1);

        clock.advance(chrono::Duration::minutes(2));
        assert!(intake.cooldown_snapshot().is_empty());
        assert_eq!(intake.cooldowns.len(), 0);
        assert_eq!(intake.limiter.tracked_keys(), 0);
    }
}

pub mod cooldown_persistence;
pub mod cooldown_tracker;
pub mod existence_guard;
pub mod horizon_filter;
pub mod intake;
pub mod owner_resolver;
pub mod persistence_flusher;
pub mod rate_limiter;
pub mod selector_matcher;

pub use cooldown_persistence::{
    CooldownPersistence, PersistenceStats, PersistenceStatsSnapshot, SyncError, SyncReport,
};
pub use cooldown_tracker::CooldownTracker;
pub use existence_guard::{Existence, ObjectExistenceGuard};
pub use horizon_filter::StartupHorizonFilter;
pub use intake::{Admission, IntakeOrchestrator, IntakeOutcome, IntakeStats, IntakeStatsSnapshot, PolicyDecision};
pub use owner_resolver::OwnerResolver;
pub use persistence_flusher::{PersistenceFlusher, SnapshotFn};
pub use rate_limiter::{RateDecision, RateLimiter};
pub use selector_matcher::{CompiledPolicy, EffectiveSettings, SelectorMatch, SelectorMatcher};

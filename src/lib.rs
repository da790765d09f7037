//! remedy-intake - admission control for an event-driven remediation controller
//!
//! Cluster warning events arrive faster than anyone can act on them. This
//! crate decides, per event and per governing policy, whether the event is
//! admitted for remediation or suppressed, and keeps the resulting cooldowns
//! durable across restarts.
//!
//! # Architecture
//!
//! Hexagonal layering:
//!
//! - **Domain Layer** (`domain`): events, policies, suppression keys, persisted records, ports
//! - **Service Layer** (`services`): horizon filter, existence guard, selector matcher,
//!   owner resolver, rate limiter, cooldown tracker, cooldown persistence, intake orchestrator
//! - **Adapters** (`adapters`): in-memory and SQLite stores, file loaders
//! - **Infrastructure Layer** (`infrastructure`): clocks, configuration, logging
//! - **CLI Layer** (`cli`): replay and inspection commands
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use remedy_intake::adapters::memory::UnavailableObjectLookup;
//! use remedy_intake::domain::models::{EventSelector, IntakeConfig, RemediationPolicy};
//! use remedy_intake::infrastructure::SystemClock;
//! use remedy_intake::services::IntakeOrchestrator;
//!
//! # async fn demo(event: remedy_intake::domain::models::ClusterEvent) {
//! let policy = RemediationPolicy::new("ops", "crashloops").with_selector(EventSelector::default());
//! let intake = IntakeOrchestrator::new(
//!     &[policy],
//!     Arc::new(UnavailableObjectLookup),
//!     Arc::new(SystemClock::new()),
//!     &IntakeConfig::default(),
//! );
//! for admission in intake.evaluate(&event).await.admissions() {
//!     // hand off to remediation, then:
//!     intake.confirm_dispatch(admission);
//! }
//! # }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    ClusterEvent, Config, CooldownStart, CooldownStateRecord, DynamicObject, ObjectIdentity, ObjectRef,
    PolicyRef, RemediationPolicy, SuppressionKey,
};
pub use domain::ports::{Clock, CooldownRecordStore, ObjectLookup, PolicySource};
pub use domain::{DomainError, DomainResult, LookupError, StoreError};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    Admission, CooldownPersistence, IntakeOrchestrator, IntakeOutcome, PersistenceFlusher, PolicyDecision,
};

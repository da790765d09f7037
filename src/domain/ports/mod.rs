//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines the interfaces the intake engine consumes:
//! - Clock: wall-clock time source
//! - ObjectLookup: "does this object exist / who owns it" against the cluster
//! - PolicySource: current remediation policies
//! - CooldownRecordStore: namespace-scoped persisted cooldown records
//!
//! These traits keep the admission logic independent of the Kubernetes
//! client and of the backing store.

pub mod clock;
pub mod cooldown_record_store;
pub mod object_lookup;
pub mod policy_source;

pub use clock::Clock;
pub use cooldown_record_store::CooldownRecordStore;
pub use object_lookup::ObjectLookup;
pub use policy_source::PolicySource;

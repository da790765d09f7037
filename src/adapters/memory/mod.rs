//! In-memory adapters.
//!
//! Used by tests and by the CLI replay mode, where the object inventory and
//! the policies come from local files instead of a live cluster.

pub mod object_lookup;
pub mod policy_source;
pub mod record_store;

pub use object_lookup::{InMemoryObjectLookup, UnavailableObjectLookup};
pub use policy_source::InMemoryPolicySource;
pub use record_store::InMemoryRecordStore;

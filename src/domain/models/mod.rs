pub mod config;
pub mod cooldown_record;
pub mod event;
pub mod object;
pub mod policy;
pub mod suppression;

pub use config::{
    Config, CooldownStart, IntakeConfig, LoggingConfig, PersistenceConfig, RotationPolicy,
};
pub use cooldown_record::{record_name, CooldownStateRecord, RecordDecodeError, RECORD_FORMAT_VERSION};
pub use event::{ClusterEvent, EventMeta, EventSeries};
pub use object::{DynamicObject, ObjectMeta, ObjectRef, OwnerReference};
pub use policy::{
    EventSelector, Mode, PersistenceSpec, PolicyList, PolicyRef, PolicySpec, RateLimitSpec,
    RemediationPolicy, RiskLevel,
};
pub use suppression::{ObjectIdentity, SuppressionKey};

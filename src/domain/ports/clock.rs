//! Time source port.

use std::fmt::Debug;

use chrono::{DateTime, Utc};

/// Port for obtaining the current wall-clock time.
///
/// Cooldowns and persisted records are expressed in wall-clock time, so the
/// whole engine reads time through this trait. Infrastructure provides
/// `SystemClock` and the controllable `ManualClock`.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

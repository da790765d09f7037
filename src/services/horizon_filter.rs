//! Startup horizon filter.
//!
//! After a restart the watch replays every event still retained by the API
//! server. Anything last observed before this process started has already
//! been handled (or deliberately ignored) by the previous incarnation.

use chrono::{DateTime, Utc};

use crate::domain::models::ClusterEvent;

/// Drops events observed strictly before a fixed start time.
#[derive(Debug, Clone, Copy)]
pub struct StartupHorizonFilter {
    started_at: DateTime<Utc>,
}

impl StartupHorizonFilter {
    pub const fn new(started_at: DateTime<Utc>) -> Self {
        Self { started_at }
    }

    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// True if the event predates the horizon.
    ///
    /// Events without any usable timestamp are kept.
    pub fn is_historical(&self, event: &ClusterEvent) -> bool {
        event
            .observed_at()
            .is_some_and(|observed| observed < self.started_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{EventSeries, ObjectRef};
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 8, 0, 0).unwrap()
    }

    fn event() -> ClusterEvent {
        ClusterEvent::new(
            "Warning",
            "BackOff",
            "Back-off restarting failed container",
            ObjectRef::new("v1", "Pod", "default", "web-0"),
        )
    }

    #[test]
    fn test_drops_events_before_start() {
        let filter = StartupHorizonFilter::new(start());
        let old = event().with_last_timestamp(start() - Duration::seconds(1));
        assert!(filter.is_historical(&old));
    }

    #[test]
    fn test_keeps_events_at_or_after_start() {
        let filter = StartupHorizonFilter::new(start());
        assert!(!filter.is_historical(&event().with_last_timestamp(start())));
        assert!(!filter.is_historical(&event().with_last_timestamp(start() + Duration::minutes(1))));
    }

    #[test]
    fn test_keeps_events_without_timestamps() {
        let filter = StartupHorizonFilter::new(start());
        assert!(!filter.is_historical(&event()));
    }

    #[test]
    fn test_uses_first_timestamp_when_last_missing() {
        let filter = StartupHorizonFilter::new(start());
        let old = event().with_first_timestamp(start() - Duration::hours(1));
        assert!(filter.is_historical(&old));
    }

    #[test]
    fn test_recent_series_observation_wins_over_old_first_timestamp() {
        let filter = StartupHorizonFilter::new(start());
        let mut recurring = event().with_first_timestamp(start() - Duration::hours(3));
        recurring.series = Some(EventSeries {
            count: 12,
            last_observed_time: Some(start() + Duration::seconds(5)),
        });
        assert!(!filter.is_historical(&recurring));
    }
}

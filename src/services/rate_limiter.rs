//! Per-key sliding-window admission cap.
//!
//! Each suppression key keeps the timestamps of its admissions within the
//! trailing window. A request is rejected when the window already holds
//! `limit` admissions; rejected requests are not recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};

use crate::domain::models::SuppressionKey;

/// Length of the trailing admission window.
pub const RATE_WINDOW_SECS: i64 = 60;

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    Limited,
}

impl RateDecision {
    pub const fn is_allow(self) -> bool {
        matches!(self, Self::Allow)
    }
}

#[derive(Debug, Default)]
struct Window {
    admissions: VecDeque<DateTime<Utc>>,
}

impl Window {
    fn expire(&mut self, now: DateTime<Utc>, window: Duration) {
        while let Some(&oldest) = self.admissions.front() {
            if now - oldest >= window {
                self.admissions.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Sliding-window rate limiter shared by all intake workers.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    windows: Mutex<HashMap<SuppressionKey, Window>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_window(Duration::seconds(RATE_WINDOW_SECS))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SuppressionKey, Window>> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Prune the key's window, then admit and record `now` if fewer than
    /// `limit` admissions remain in it.
    pub fn check_and_record(&self, key: &SuppressionKey, limit: u32, now: DateTime<Utc>) -> RateDecision {
        let mut windows = self.lock();
        let entry = windows.entry(key.clone()).or_default();
        entry.expire(now, self.window);

        if entry.admissions.len() >= limit as usize {
            return RateDecision::Limited;
        }
        entry.admissions.push_back(now);
        RateDecision::Allow
    }

    /// Admissions currently counted for `key`.
    pub fn admissions_in_window(&self, key: &SuppressionKey, now: DateTime<Utc>) -> usize {
        let windows = self.lock();
        windows
            .get(key)
            .map(|w| w.admissions.iter().filter(|&&t| now - t < self.window).count())
            .unwrap_or(0)
    }

    /// Drop keys whose window has fully elapsed. Returns how many were removed.
    pub fn prune_idle(&self, now: DateTime<Utc>) -> usize {
        let mut windows = self.lock();
        let before = windows.len();
        windows.retain(|_, w| {
            w.expire(now, self.window);
            !w.admissions.is_empty()
        });
        before - windows.len()
    }

    pub fn tracked_keys(&self) -> usize {
        self.lock().len()
    }
}

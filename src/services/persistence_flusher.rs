//! Background flush loop for cooldown persistence.
//!
//! One task calls [`CooldownPersistence::sync`] on a fixed interval with a
//! snapshot taken through a caller-supplied accessor, so the flusher never
//! touches the tracker's lock itself. `trigger_now` requests an early cycle.
//! At shutdown, [`PersistenceFlusher::flush_and_wait`] stops the loop, lets an
//! in-flight cycle finish, and runs exactly one final sync.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::cooldown_persistence::{CooldownPersistence, SyncError, SyncReport};
use crate::domain::models::SuppressionKey;

/// Produces the cooldown state to flush.
pub type SnapshotFn = Arc<dyn Fn() -> HashMap<SuppressionKey, DateTime<Utc>> + Send + Sync>;

pub struct PersistenceFlusher {
    persistence: Arc<CooldownPersistence>,
    snapshot: SnapshotFn,
    interval: Duration,
    running: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    trigger: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
    final_flush_done: AtomicBool,
}

impl PersistenceFlusher {
    pub fn new(persistence: Arc<CooldownPersistence>, snapshot: SnapshotFn, interval: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            persistence,
            snapshot,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            shutdown,
            trigger: Arc::new(Notify::new()),
            handle: Mutex::new(None),
            final_flush_done: AtomicBool::new(false),
        }
    }

    /// Start the flush loop. Returns `false` if it was already started or
    /// has been shut down.
    pub fn start(&self) -> bool {
        if *self.shutdown.borrow() || self.running.swap(true, Ordering::SeqCst) {
            return false;
        }

        let persistence = self.persistence.clone();
        let snapshot = self.snapshot.clone();
        let running = self.running.clone();
        let trigger = self.trigger.clone();
        let mut shutdown_rx = self.shutdown.subscribe();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            tracing::info!(interval_secs = period.as_secs_f64(), "cooldown flusher started");
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {}
                    () = trigger.notified() => {}
                }
                if *shutdown_rx.borrow() {
                    break;
                }
                run_cycle(&persistence, &snapshot).await;
            }
            running.store(false, Ordering::SeqCst);
            tracing::info!("cooldown flusher stopped");
        });

        *self.handle.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        true
    }

    /// Request a sync cycle without waiting for the next tick.
    pub fn trigger_now(&self) {
        self.trigger.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal shutdown and wait for the loop to exit. A cycle already in
    /// progress completes; no new one starts.
    pub async fn stop(&self) {
        // send_replace never fails, even with no receiver left.
        self.shutdown.send_replace(true);
        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!("cooldown flusher task ended abnormally: {}", e);
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stop the loop and run the final sync. Only the first call syncs;
    /// later calls return `None`.
    pub async fn flush_and_wait(&self) -> Option<Result<SyncReport, SyncError>> {
        self.stop().await;
        if self.final_flush_done.swap(true, Ordering::SeqCst) {
            return None;
        }
        let snapshot = (self.snapshot)();
        let result = self.persistence.sync(&snapshot).await;
        match &result {
            Ok(report) => tracing::info!(
                written = report.written.len(),
                keys_cleared = report.keys_cleared,
                "final cooldown flush complete"
            ),
            Err(e) => tracing::warn!(error = %e, "final cooldown flush incomplete"),
        }
        Some(result)
    }
}

async fn run_cycle(persistence: &CooldownPersistence, snapshot: &SnapshotFn) {
    let state = snapshot();
    match persistence.sync(&state).await {
        Ok(report) => {
            if !report.written.is_empty() || !report.discarded.is_empty() {
                tracing::debug!(
                    written = report.written.len(),
                    discarded = report.discarded.len(),
                    keys_cleared = report.keys_cleared,
                    "cooldown flush cycle"
                );
            }
        }
        Err(e) => {
            for failure in &e.failures {
                tracing::warn!(policy = %failure.policy, error = %failure.error, "cooldown record not written");
            }
        }
    }
    let stats = persistence.stats().snapshot();
    tracing::trace!(
        flushes_succeeded = stats.flushes_succeeded,
        flushes_failed = stats.flushes_failed,
        "persistence stats"
    );
}

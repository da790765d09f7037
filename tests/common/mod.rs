//! Common test utilities for integration tests
//!
//! Shared fixtures: a fixed start instant, policy and event builders, and a
//! small object inventory with owner chains.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Utc};
use remedy_intake::adapters::memory::InMemoryObjectLookup;
use remedy_intake::domain::models::{
    ClusterEvent, CooldownStart, DynamicObject, EventSelector, IntakeConfig, ObjectRef, RemediationPolicy,
};
use remedy_intake::infrastructure::clock::ManualClock;
use remedy_intake::services::IntakeOrchestrator;
use tempfile::TempDir;

/// Process start used by every fixture.
pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Path of a SQLite database inside a fresh temp directory.
pub fn temp_db_path() -> (TempDir, String) {
    let dir = temp_dir();
    let path = dir.path().join("cooldowns.db").to_string_lossy().into_owned();
    (dir, path)
}

/// Setup test logging
#[allow(dead_code)]
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Policy whose single selector matches every event.
pub fn wildcard_policy(name: &str, events_per_minute: u32, cooldown_minutes: u32) -> RemediationPolicy {
    RemediationPolicy::new("ops", name)
        .with_selector(EventSelector::default())
        .with_rate_limit(events_per_minute, cooldown_minutes)
}

pub fn warning(reason: &str, object: ObjectRef, at: DateTime<Utc>) -> ClusterEvent {
    ClusterEvent::new("Warning", reason, "something went wrong", object).with_last_timestamp(at)
}

pub fn pod(namespace: &str, name: &str) -> ObjectRef {
    ObjectRef::new("v1", "Pod", namespace, name)
}

/// `web` Deployment with one ReplicaSet and two pods, and a `backup`
/// CronJob with two runs of one pod each.
pub fn inventory() -> InMemoryObjectLookup {
    let deploy = DynamicObject::new("apps/v1", "Deployment", "default", "web");
    let rs = DynamicObject::new("apps/v1", "ReplicaSet", "default", "web-7d4b9c8f6d").owned_by(&deploy, true);
    let web_a = DynamicObject::new("v1", "Pod", "default", "web-7d4b9c8f6d-q2w5z").owned_by(&rs, true);
    let web_b = DynamicObject::new("v1", "Pod", "default", "web-7d4b9c8f6d-x7k2p").owned_by(&rs, true);

    let cron = DynamicObject::new("batch/v1", "CronJob", "ops", "backup");
    let job_a = DynamicObject::new("batch/v1", "Job", "ops", "backup-28405760").owned_by(&cron, true);
    let job_b = DynamicObject::new("batch/v1", "Job", "ops", "backup-28405820").owned_by(&cron, true);
    let run_a = DynamicObject::new("v1", "Pod", "ops", "backup-28405760-x7k2p").owned_by(&job_a, true);
    let run_b = DynamicObject::new("v1", "Pod", "ops", "backup-28405820-b9zq4").owned_by(&job_b, true);

    let standalone = DynamicObject::new("v1", "Pod", "default", "standalone");

    InMemoryObjectLookup::from_objects([deploy, rs, web_a, web_b, cron, job_a, job_b, run_a, run_b, standalone])
}

pub fn orchestrator(
    policies: &[RemediationPolicy],
    lookup: InMemoryObjectLookup,
    clock: &ManualClock,
    cooldown_start: CooldownStart,
) -> IntakeOrchestrator {
    let config = IntakeConfig {
        cooldown_start,
        lookup_timeout_ms: 500,
        ..IntakeConfig::default()
    };
    IntakeOrchestrator::new(policies, Arc::new(lookup), Arc::new(clock.clone()), &config)
}

//! Event replay through the intake engine.
//!
//! Events are read as JSON lines from a file or stdin and evaluated by a
//! bounded pool of workers. Each admission is printed to stdout as one JSON
//! line and immediately confirmed as dispatched. Cooldowns flush to the
//! SQLite store in the background; the final flush runs at EOF or Ctrl-C,
//! once every in-flight worker has finished.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

use crate::adapters::files::{load_inventory, load_policies, parse_event_line};
use crate::adapters::memory::{InMemoryObjectLookup, InMemoryPolicySource, UnavailableObjectLookup};
use crate::adapters::sqlite::{initialize_database, SqliteCooldownRecordStore};
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::domain::ports::{Clock, ObjectLookup};
use crate::infrastructure::clock::SystemClock;
use crate::services::{
    CooldownPersistence, IntakeOrchestrator, IntakeStatsSnapshot, PersistenceFlusher, PersistenceStatsSnapshot,
};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Policy file (YAML stream or `policies:` list)
    #[arg(short, long)]
    pub policies: PathBuf,

    /// JSON-lines event file; reads stdin when omitted
    #[arg(short, long)]
    pub events: Option<PathBuf>,

    /// Object inventory (YAML) answering existence and owner lookups.
    /// Without it every lookup is ambiguous and intake fails open.
    #[arg(short, long)]
    pub inventory: Option<PathBuf>,

    /// Concurrent intake workers (overrides intake.workers)
    #[arg(short, long)]
    pub workers: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub events_read: u64,
    pub unparseable_lines: u64,
    pub interrupted: bool,
    pub intake: IntakeStatsSnapshot,
    pub persistence: PersistenceStatsSnapshot,
    pub final_flush_ok: bool,
}

impl CommandOutput for RunSummary {
    fn to_human(&self) -> String {
        let i = &self.intake;
        let p = &self.persistence;
        let mut lines = vec![
            format!(
                "Replay {}: {} event(s) read, {} unparseable line(s)",
                if self.interrupted { "interrupted" } else { "complete" },
                self.events_read,
                self.unparseable_lines
            ),
            format!("  admitted:               {}", i.admitted),
            format!("  rate limited:           {}", i.rate_limited),
            format!("  in cooldown:            {}", i.in_cooldown),
            format!("  no selector match:      {}", i.no_selector_match),
            format!("  dropped (historical):   {}", i.dropped_historical),
            format!("  dropped (deleted obj):  {}", i.dropped_deleted_object),
            format!("  lookups failed open:    {}", i.lookup_fail_open),
            format!(
                "Persistence: {} flush(es) ok, {} failed, {} entr(ies) restored, {} record(s) skipped",
                p.flushes_succeeded, p.flushes_failed, p.entries_restored, p.records_skipped
            ),
        ];
        if !self.final_flush_ok {
            lines.push("Warning: final cooldown flush did not complete; see logs".to_string());
        }
        lines.join("\n")
    }
}

async fn open_events(path: Option<&PathBuf>) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open event file {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}

fn build_lookup(inventory: Option<&PathBuf>) -> Result<Arc<dyn ObjectLookup>> {
    match inventory {
        Some(path) => {
            let objects = load_inventory(path)
                .with_context(|| format!("Failed to load inventory from {}", path.display()))?;
            tracing::info!(objects = objects.len(), "object inventory loaded");
            Ok(Arc::new(InMemoryObjectLookup::from_objects(objects)))
        }
        None => {
            tracing::warn!("no inventory given; existence checks will fail open");
            Ok(Arc::new(UnavailableObjectLookup))
        }
    }
}

struct ReplayCounts {
    events_read: u64,
    unparseable_lines: u64,
    interrupted: bool,
}

/// Feed every event line to the worker pool until EOF or `stop` resolves,
/// then wait for every in-flight worker before returning.
async fn replay(
    reader: Box<dyn AsyncBufRead + Unpin + Send>,
    intake: Arc<IntakeOrchestrator>,
    workers: usize,
    stop: impl Future<Output = ()>,
) -> Result<ReplayCounts> {
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();
    let mut lines = reader.lines();
    let mut counts = ReplayCounts {
        events_read: 0,
        unparseable_lines: 0,
        interrupted: false,
    };
    let mut line_no = 0u64;
    tokio::pin!(stop);

    let read_result: Result<()> = loop {
        let line = tokio::select! {
            biased;
            () = &mut stop => {
                counts.interrupted = true;
                break Ok(());
            }
            line = lines.next_line() => line,
        };
        let line = match line.context("Failed to read events") {
            Ok(Some(line)) => line,
            Ok(None) => break Ok(()),
            Err(e) => break Err(e),
        };
        line_no += 1;
        let event = match parse_event_line(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "skipping unparseable event");
                counts.unparseable_lines += 1;
                continue;
            }
        };
        let permit = tokio::select! {
            biased;
            () = &mut stop => {
                counts.interrupted = true;
                break Ok(());
            }
            permit = semaphore.clone().acquire_owned() => match permit.context("Worker pool closed") {
                Ok(permit) => permit,
                Err(e) => break Err(e),
            },
        };
        counts.events_read += 1;
        let intake = intake.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let outcome = intake.evaluate(&event).await;
            for admission in outcome.admissions() {
                match serde_json::to_string(admission) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::error!(key = %admission.key, error = %e, "failed to encode admission"),
                }
                intake.confirm_dispatch(admission);
            }
        });
        // Reap finished workers so the set stays bounded by the pool size.
        while let Some(joined) = tasks.try_join_next() {
            log_worker_exit(joined);
        }
    };

    if counts.interrupted {
        tracing::info!(in_flight = tasks.len(), "stopped reading events, waiting for workers");
    }
    while let Some(joined) = tasks.join_next().await {
        log_worker_exit(joined);
    }
    read_result.map(|()| counts)
}

fn log_worker_exit(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "intake worker ended abnormally");
    }
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("interrupted, finishing in-flight events");
}

pub async fn execute(args: RunArgs, config: &Config, json_mode: bool) -> Result<()> {
    let policies = load_policies(&args.policies)
        .with_context(|| format!("Failed to load policies from {}", args.policies.display()))?;
    tracing::info!(policies = policies.len(), "policies loaded");

    let workers = args.workers.unwrap_or(config.intake.workers).max(1);
    let lookup = build_lookup(args.inventory.as_ref())?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());

    let pool = initialize_database(&config.persistence.database_path)
        .await
        .with_context(|| format!("Failed to open cooldown store at {}", config.persistence.database_path))?;
    let persistence = Arc::new(CooldownPersistence::new(
        Arc::new(SqliteCooldownRecordStore::new(pool)),
        Arc::new(InMemoryPolicySource::new(policies.clone())),
        clock.clone(),
        config.persistence.min_persist_duration(),
        config.persistence.io_timeout(),
    ));

    let intake = Arc::new(
        IntakeOrchestrator::new(&policies, lookup, clock, &config.intake).with_persistence(persistence.clone()),
    );
    intake.restore_cooldowns(persistence.load().await);
    match persistence.collect_orphans().await {
        Ok(0) => {}
        Ok(removed) => tracing::info!(removed, "removed orphaned cooldown records"),
        Err(e) => tracing::warn!(error = %e, "orphan collection failed"),
    }

    let flusher = PersistenceFlusher::new(persistence.clone(), intake.snapshot_fn(), config.persistence.sync_interval());
    flusher.start();

    let reader = open_events(args.events.as_ref()).await?;
    tracing::info!(workers, started_at = %intake.started_at(), "replaying events");

    // Workers are drained before the final flush, so every confirmed
    // cooldown is in the snapshot it writes.
    let replayed = replay(reader, intake.clone(), workers, interrupted()).await;
    let final_flush_ok = matches!(flusher.flush_and_wait().await, Some(Ok(_)));
    let counts = replayed?;

    let summary = RunSummary {
        events_read: counts.events_read,
        unparseable_lines: counts.unparseable_lines,
        interrupted: counts.interrupted,
        intake: intake.stats().snapshot(),
        persistence: persistence.stats().snapshot(),
        final_flush_ok,
    };
    // Stdout carries admissions; the summary goes to stderr unless JSON was asked for.
    if json_mode {
        output(&summary, true);
    } else {
        eprintln!("{}", summary.to_human());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DynamicObject, EventSelector, IntakeConfig, RemediationPolicy};
    use crate::infrastructure::clock::ManualClock;
    use chrono::{DateTime, Utc};
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_replay_counts_and_skips_bad_lines() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = ManualClock::new(now);
        let policy = RemediationPolicy::new("ops", "p")
            .with_selector(EventSelector::default())
            .with_rate_limit(1, 10);
        let intake = Arc::new(IntakeOrchestrator::new(
            &[policy],
            Arc::new(UnavailableObjectLookup),
            Arc::new(clock),
            &IntakeConfig::default(),
        ));

        let event = r#"{"type":"Warning","reason":"BackOff","message":"restarting","involvedObject":{"apiVersion":"v1","kind":"Pod","namespace":"default","name":"web-0"},"lastTimestamp":"2024-05-01T12:00:00Z"}"#;
        let input = format!("# header\n{event}\nnot json\n\n{event}\n");
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = Box::new(BufReader::new(std::io::Cursor::new(input)));

        let counts = replay(reader, intake.clone(), 2, std::future::pending()).await.unwrap();
        assert!(!counts.interrupted);
        assert_eq!(counts.events_read, 2);
        assert_eq!(counts.unparseable_lines, 1);

        let stats = intake.stats().snapshot();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.lookup_fail_open, 2);
        // The first admission is confirmed, so the second event is suppressed.
        assert_eq!(stats.admitted + stats.in_cooldown + stats.rate_limited, 2);
        assert_eq!(stats.admitted, 1);
    }

    #[tokio::test]
    async fn test_interrupt_waits_for_in_flight_workers() {
        let now = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let lookup = InMemoryObjectLookup::from_objects([DynamicObject::new("v1", "Pod", "default", "web-0")])
            .with_latency(std::time::Duration::from_millis(150));
        let intake = Arc::new(IntakeOrchestrator::new(
            &[RemediationPolicy::new("ops", "p").with_selector(EventSelector::default())],
            Arc::new(lookup),
            Arc::new(ManualClock::new(now)),
            &IntakeConfig::default(),
        ));

        // The stream stays open, so only the stop signal ends reading.
        let (mut tx, rx) = tokio::io::duplex(4096);
        let event = r#"{"type":"Warning","reason":"BackOff","message":"restarting","involvedObject":{"apiVersion":"v1","kind":"Pod","namespace":"default","name":"web-0"},"lastTimestamp":"2024-05-01T12:00:00Z"}"#;
        tx.write_all(format!("{event}\n").as_bytes()).await.unwrap();
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = Box::new(BufReader::new(rx));

        let stop = tokio::time::sleep(std::time::Duration::from_millis(30));
        let counts = replay(reader, intake.clone(), 2, stop).await.unwrap();
        assert!(counts.interrupted);
        assert_eq!(counts.events_read, 1);

        // The worker was mid-lookup at the interrupt and still confirmed.
        assert_eq!(intake.stats().snapshot().admitted, 1);
        assert_eq!(intake.cooldown_snapshot().len(), 1);
        drop(tx);
    }

    #[test]
    fn test_summary_human_output() {
        let summary = RunSummary {
            events_read: 3,
            unparseable_lines: 0,
            interrupted: false,
            intake: IntakeStatsSnapshot {
                received: 3,
                admitted: 2,
                ..IntakeStatsSnapshot::default()
            },
            persistence: PersistenceStatsSnapshot::default(),
            final_flush_ok: false,
        };
        let text = summary.to_human();
        assert!(text.contains("Replay complete: 3 event(s)"));
        assert!(text.contains("admitted:               2"));
        assert!(text.contains("final cooldown flush did not complete"));
    }
}

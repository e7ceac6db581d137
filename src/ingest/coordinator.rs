// src/ingest/coordinator.rs
//! One collection cycle: fan out to every adapter, persist what succeeds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, gauge, histogram};
use serde::Serialize;

use crate::error::{ErrorKind, FetchError, StoreError};
use crate::ingest::normalize::normalize;
use crate::ingest::types::SourceAdapter;
use crate::model::{PutOutcome, Source};
use crate::store::{SnapshotStore, DEFAULT_IO_TIMEOUT};

#[derive(Debug, Clone, Copy)]
pub struct CycleSettings {
    /// Added to each adapter's request timeout to bound one source task.
    pub store_timeout: Duration,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            store_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeResult {
    Stored {
        items: usize,
        dropped: usize,
        put: PutOutcome,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceOutcome {
    pub source: Source,
    #[serde(flatten)]
    pub result: OutcomeResult,
}

impl SourceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.result, OutcomeResult::Stored { .. })
    }

    fn failed(source: Source, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            source,
            result: OutcomeResult::Failed {
                kind,
                message: message.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleReport {
    pub poll_time: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per adapter, ordered by source.
    pub outcomes: Vec<SourceOutcome>,
}

impl CycleReport {
    pub fn successes(&self) -> impl Iterator<Item = &SourceOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &SourceOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// True when at least one source was attempted and none succeeded.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.successes().next().is_none()
    }

    pub fn outcome(&self, source: Source) -> Option<&SourceOutcome> {
        self.outcomes.iter().find(|o| o.source == source)
    }
}

pub struct CollectionCoordinator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    store: Arc<SnapshotStore>,
    settings: CycleSettings,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag however the cycle ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CollectionCoordinator {
    pub fn new(
        adapters: Vec<Arc<dyn SourceAdapter>>,
        store: Arc<SnapshotStore>,
        settings: CycleSettings,
    ) -> Self {
        Self {
            adapters,
            store,
            settings,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    pub fn sources(&self) -> Vec<Source> {
        self.adapters.iter().map(|a| a.source()).collect()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run a cycle unless one is already running; `None` means skipped.
    pub async fn try_run_cycle(&self, poll_time: DateTime<Utc>) -> Option<CycleReport> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!(target: "ingest", "cycle already in flight, skipping trigger");
            return None;
        }
        let _guard = InFlight(&self.in_flight);
        Some(self.run_cycle(poll_time).await)
    }

    /// Attempt every adapter once. Never fails as a whole.
    pub async fn run_cycle(&self, poll_time: DateTime<Utc>) -> CycleReport {
        super::ensure_metrics_described();
        counter!("collect_cycles_total").increment(1);

        let handles: Vec<_> = self
            .adapters
            .iter()
            .map(|adapter| {
                let adapter = Arc::clone(adapter);
                let store = Arc::clone(&self.store);
                let budget = adapter.config().request_timeout + self.settings.store_timeout;
                let source = adapter.source();
                let task = tokio::spawn(async move {
                    match tokio::time::timeout(budget, collect_source(adapter, store, poll_time))
                        .await
                    {
                        Ok(outcome) => outcome,
                        Err(_) => SourceOutcome::failed(
                            source,
                            ErrorKind::Timeout,
                            format!("source task exceeded {budget:?}"),
                        ),
                    }
                });
                (source, task)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (source, task) in handles {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(join_err) => {
                    tracing::error!(
                        target: "ingest",
                        source = %source,
                        error = %join_err,
                        "source task panicked"
                    );
                    SourceOutcome::failed(source, ErrorKind::Panic, join_err.to_string())
                }
            };
            record_outcome(&outcome);
            outcomes.push(outcome);
        }
        outcomes.sort_by_key(|o| o.source);

        let report = CycleReport {
            poll_time,
            finished_at: Utc::now(),
            outcomes,
        };
        tracing::info!(
            target: "ingest",
            poll_time = %report.poll_time,
            ok = report.successes().count(),
            failed = report.failures().count(),
            "collection cycle finished"
        );
        report
    }
}

async fn collect_source(
    adapter: Arc<dyn SourceAdapter>,
    store: Arc<SnapshotStore>,
    poll_time: DateTime<Utc>,
) -> SourceOutcome {
    let source = adapter.source();
    let cfg = adapter.config();

    let started = Instant::now();
    let fetched = adapter.fetch(cfg.request_timeout).await;
    histogram!("collect_fetch_ms", "source" => source.as_str())
        .record(started.elapsed().as_secs_f64() * 1000.0);

    let raw = match fetched {
        Ok(raw) => raw,
        Err(e) => {
            let kind = match e {
                FetchError::Timeout { .. } => ErrorKind::Timeout,
                _ => ErrorKind::Fetch,
            };
            tracing::warn!(target: "ingest", source = %source, error = %e, "fetch failed");
            return SourceOutcome::failed(source, kind, e.to_string());
        }
    };

    let parsed = match adapter.parse(&raw) {
        Ok(items) => items,
        Err(e) => {
            // Shape changes upstream are the main reason a source goes dark; alert loudly.
            tracing::error!(
                target: "ingest",
                source = %source,
                schema_version = %cfg.schema_version,
                url = %raw.url,
                error = %e,
                "payload no longer matches adapter schema"
            );
            return SourceOutcome::failed(source, ErrorKind::Parse, e.to_string());
        }
    };

    let normalized = match normalize(source, poll_time, parsed) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(target: "ingest", source = %source, error = %e, "normalization failed");
            return SourceOutcome::failed(source, ErrorKind::Normalize, e.to_string());
        }
    };
    if normalized.dropped > 0 {
        counter!("collect_items_dropped_total", "source" => source.as_str())
            .increment(normalized.dropped as u64);
    }

    match store.put(&normalized.snapshot).await {
        Ok(put) => SourceOutcome {
            source,
            result: OutcomeResult::Stored {
                items: normalized.snapshot.items.len(),
                dropped: normalized.dropped,
                put,
            },
        },
        Err(e) => {
            let kind = match e {
                StoreError::Timeout(_) => ErrorKind::Timeout,
                _ => ErrorKind::Store,
            };
            tracing::warn!(target: "ingest", source = %source, error = %e, "store write failed");
            SourceOutcome::failed(source, kind, e.to_string())
        }
    }
}

fn record_outcome(outcome: &SourceOutcome) {
    let source = outcome.source.as_str();
    match &outcome.result {
        OutcomeResult::Stored { items, put, .. } => {
            counter!("collect_source_success_total", "source" => source).increment(1);
            gauge!("collect_last_success_ts", "source" => source)
                .set(Utc::now().timestamp() as f64);
            tracing::debug!(target: "ingest", source, items, ?put, "source collected");
        }
        OutcomeResult::Failed { kind, .. } => {
            counter!(
                "collect_source_failures_total",
                "source" => source,
                "kind" => kind.as_str()
            )
            .increment(1);
        }
    }
}

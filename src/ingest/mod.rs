// src/ingest/mod.rs
pub mod config;
pub mod coordinator;
pub mod normalize;
pub mod providers;
pub mod scheduler;
pub mod types;

pub use coordinator::{CollectionCoordinator, CycleReport, CycleSettings, OutcomeResult, SourceOutcome};
pub use scheduler::{Scheduler, SchedulerState};
pub use types::{RawItem, RawResponse, SourceAdapter};

use metrics::{describe_counter, describe_gauge, describe_histogram};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("collect_cycles_total", "Collection cycles started.");
        describe_counter!(
            "collect_source_success_total",
            "Sources whose snapshot was stored in a cycle."
        );
        describe_counter!(
            "collect_source_failures_total",
            "Sources that failed in a cycle, by error kind."
        );
        describe_counter!(
            "collect_items_dropped_total",
            "Board items dropped during normalization."
        );
        describe_histogram!("collect_fetch_ms", "Upstream fetch time in milliseconds.");
        describe_gauge!(
            "collect_last_success_ts",
            "Unix ts of the last stored snapshot per source."
        );
        describe_counter!(
            "store_pruned_snapshots_total",
            "Snapshots removed by retention pruning."
        );
    });
}

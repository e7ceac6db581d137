// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod store;

pub use crate::api::router;
pub use crate::ingest::{CollectionCoordinator, CycleReport, Scheduler, SchedulerState};
pub use crate::model::{RankingItem, Snapshot, Source};
pub use crate::store::SnapshotStore;

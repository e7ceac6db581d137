// src/ingest/scheduler.rs
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::SchedulerError;
use crate::ingest::coordinator::{CollectionCoordinator, CycleReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Running,
    /// Terminal.
    Stopped,
}

/// Drives collection cycles on a fixed interval. At most one cycle runs at a time.
pub struct Scheduler {
    coordinator: Arc<CollectionCoordinator>,
    retention: Option<Duration>,
    state: watch::Sender<SchedulerState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(coordinator: Arc<CollectionCoordinator>, retention: Option<Duration>) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            coordinator,
            retention,
            state,
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    /// Enter `Running` and fire the first cycle right away.
    pub fn start(&self, interval: Duration) -> Result<(), SchedulerError> {
        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        let current = *self.state.borrow();
        match current {
            SchedulerState::Running => return Err(SchedulerError::AlreadyRunning),
            SchedulerState::Stopped => return Err(SchedulerError::Stopped),
            SchedulerState::Idle => {}
        }

        self.state.send_replace(SchedulerState::Running);
        let state_rx = self.state.subscribe();
        *task = Some(tokio::spawn(run_loop(
            Arc::clone(&self.coordinator),
            self.retention,
            interval,
            state_rx,
        )));
        tracing::info!(target: "scheduler", ?interval, "scheduler started");
        Ok(())
    }

    /// Stop scheduling. An in-flight cycle finishes before this returns.
    pub async fn stop(&self) {
        self.state.send_replace(SchedulerState::Stopped);
        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(target: "scheduler", error = %e, "scheduler loop ended abnormally");
            }
        }
        tracing::info!(target: "scheduler", "scheduler stopped");
    }

    /// One manual cycle. `None` if a cycle is already in flight or the scheduler is stopped.
    pub async fn run_once(&self) -> Option<CycleReport> {
        if self.state() == SchedulerState::Stopped {
            return None;
        }
        guarded_cycle(&self.coordinator, self.retention).await
    }
}

async fn run_loop(
    coordinator: Arc<CollectionCoordinator>,
    retention: Option<Duration>,
    interval: Duration,
    mut state_rx: watch::Receiver<SchedulerState>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let started = tokio::select! {
            biased;
            changed = state_rx.changed() => {
                if changed.is_err() || *state_rx.borrow_and_update() == SchedulerState::Stopped {
                    break;
                }
                continue;
            }
            tick = ticker.tick() => tick,
        };

        guarded_cycle(&coordinator, retention).await;

        // Ticks that fell due while the cycle ran are dropped, not run late.
        ticker.reset_at(next_boundary(started, interval, Instant::now()));

        if *state_rx.borrow() == SchedulerState::Stopped {
            break;
        }
    }
    tracing::debug!(target: "scheduler", "scheduler loop exited");
}

/// First tick boundary `started + k * interval` (k >= 1) that lies after `now`.
fn next_boundary(started: Instant, interval: Duration, now: Instant) -> Instant {
    let mut next = started + interval;
    if next <= now && !interval.is_zero() {
        let behind = now.duration_since(next).as_nanos() / interval.as_nanos();
        next += interval * (behind as u32 + 1);
    }
    next
}

/// Run one cycle in its own task so a panic surfaces as a `JoinError`, then prune.
async fn guarded_cycle(
    coordinator: &Arc<CollectionCoordinator>,
    retention: Option<Duration>,
) -> Option<CycleReport> {
    let coord = Arc::clone(coordinator);
    let report = match tokio::spawn(async move { coord.try_run_cycle(Utc::now()).await }).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(target: "scheduler", error = %e, "collection cycle panicked");
            return None;
        }
    };

    if report.is_some() {
        if let Some(horizon) = retention {
            prune_older_than(coordinator, horizon).await;
        }
    }
    report
}

async fn prune_older_than(coordinator: &CollectionCoordinator, horizon: Duration) {
    let Ok(horizon) = chrono::Duration::from_std(horizon) else {
        tracing::warn!(target: "scheduler", ?horizon, "retention horizon out of range, not pruning");
        return;
    };
    let cutoff = Utc::now() - horizon;
    match coordinator.store().prune(cutoff).await {
        Ok(removed) => {
            counter!("store_pruned_snapshots_total").increment(removed);
            tracing::info!(target: "scheduler", removed, %cutoff, "retention prune done");
        }
        Err(e) => tracing::warn!(target: "scheduler", error = %e, "retention prune failed"),
    }
}

//! hotboard-collector: binary entrypoint.
//! Loads config, opens the snapshot store, starts the scheduler and serves the
//! read-only API until Ctrl-C. `--once` runs a single cycle and exits.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hotboard_collector::api::{self, ApiState};
use hotboard_collector::ingest::{config, providers, CollectionCoordinator, CycleSettings, Scheduler};
use hotboard_collector::metrics::Metrics;
use hotboard_collector::store::SnapshotStore;

/// `RUST_LOG` picks the filter; `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hotboard_collector=info,warn"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let once = std::env::args().skip(1).any(|a| a == "--once");

    let cfg = config::load_default().context("loading collector config")?;
    let store = Arc::new(
        SnapshotStore::open(&cfg.database_url, cfg.store_timeout)
            .await
            .with_context(|| format!("opening snapshot store at {}", cfg.database_url))?,
    );

    let adapters = providers::build_enabled(&cfg);
    tracing::info!(
        sources = ?adapters.iter().map(|a| a.source()).collect::<Vec<_>>(),
        poll_interval = ?cfg.poll_interval,
        "collector configured"
    );

    let coordinator = Arc::new(CollectionCoordinator::new(
        adapters,
        Arc::clone(&store),
        CycleSettings {
            store_timeout: cfg.store_timeout,
        },
    ));

    if once {
        let report = coordinator.run_cycle(Utc::now()).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        if report.all_failed() {
            anyhow::bail!("every source failed in this cycle");
        }
        return Ok(());
    }

    let metrics = Metrics::init()?;
    let scheduler = Scheduler::new(Arc::clone(&coordinator), cfg.retention_horizon);
    scheduler.start(cfg.poll_interval)?;

    let app = api::router(ApiState { store }, Some(metrics.handle.clone()));
    let listener = tokio::net::TcpListener::bind(&cfg.api_bind)
        .await
        .with_context(|| format!("binding API on {}", cfg.api_bind))?;
    tracing::info!(addr = %cfg.api_bind, "dashboard API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await
        .context("serving API")?;

    scheduler.stop().await;
    Ok(())
}

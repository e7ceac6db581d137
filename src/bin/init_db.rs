//! Create the snapshot tables in the configured database. Safe to re-run.

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use hotboard_collector::ingest::config;
use hotboard_collector::store::{self, schema};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cfg = config::load_default().context("loading collector config")?;
    let pool = store::connect(&cfg.database_url)
        .await
        .with_context(|| format!("connecting to {}", cfg.database_url))?;
    schema::bootstrap(&pool)
        .await
        .context("creating snapshot schema")?;

    println!("schema ready at {}", cfg.database_url);
    Ok(())
}

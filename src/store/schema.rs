//! Storage bootstrap.
//!
//! The store itself never creates tables; this module is what `init-db` (and
//! the test suites) run once against a fresh database. Re-running is a no-op.

use sqlx::SqlitePool;
use tracing::info;

pub const SNAPSHOTS_TABLE: &str = "snapshots";
pub const ITEMS_TABLE: &str = "items";

/// Statements applied in order by [`bootstrap`].
pub const DDL: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS snapshots (
        source       TEXT    NOT NULL,   -- 'zhihu' | 'weibo' | 'douyin' | 'baidu'
        fetched_at   INTEGER NOT NULL,   -- poll time, unix milliseconds UTC
        item_count   INTEGER NOT NULL,
        content_hash TEXT    NOT NULL,   -- sha256 over the ordered items
        PRIMARY KEY (source, fetched_at)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS items (
        source          TEXT    NOT NULL,
        fetched_at      INTEGER NOT NULL,
        rank            INTEGER NOT NULL CHECK (rank >= 1),
        title           TEXT    NOT NULL,
        heat            REAL,
        url             TEXT,
        source_item_key TEXT    NOT NULL,
        PRIMARY KEY (source, fetched_at, rank),
        UNIQUE (source, fetched_at, source_item_key),
        FOREIGN KEY (source, fetched_at)
            REFERENCES snapshots (source, fetched_at) ON DELETE CASCADE
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_items_source_key ON items (source, source_item_key, fetched_at)",
    "CREATE INDEX IF NOT EXISTS idx_snapshots_fetched_at ON snapshots (fetched_at)",
];

/// Create tables and indexes if missing.
pub async fn bootstrap(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for stmt in DDL {
        sqlx::query(stmt).execute(pool).await?;
    }
    info!(target: "store", "schema ready");
    Ok(())
}

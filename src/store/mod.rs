//! SQLite-backed snapshot store.
//!
//! Snapshots are keyed by `(source, fetched_at)` with `fetched_at` stored as
//! unix milliseconds. Every write is a single transaction, so a snapshot and
//! its items become visible together or not at all.

pub mod schema;

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::model::{
    HistoryPoint, PutOutcome, RankingItem, Snapshot, Source, SourceStatus, TimeRange,
};

pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// Pool with WAL journaling, `synchronous=NORMAL` and a busy timeout so
/// concurrent writers wait instead of failing.
pub async fn connect(url: &str) -> Result<SqlitePool, sqlx::Error> {
    let opts = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(opts)
        .await
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    pool: SqlitePool,
    io_timeout: Duration,
}

impl SnapshotStore {
    /// Connect to `url` (e.g. `sqlite://hot.db`) and check the schema exists.
    pub async fn open(url: &str, io_timeout: Duration) -> Result<Self, StoreError> {
        let pool = connect(url).await?;
        Self::from_pool(pool, io_timeout).await
    }

    /// Wrap an existing pool. Fails with `SchemaMissing` if bootstrap has not run.
    pub async fn from_pool(pool: SqlitePool, io_timeout: Duration) -> Result<Self, StoreError> {
        for table in [schema::SNAPSHOTS_TABLE, schema::ITEMS_TABLE] {
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
            )
            .bind(table)
            .fetch_one(&pool)
            .await?;
            if !exists {
                return Err(StoreError::SchemaMissing(table));
            }
        }
        Ok(Self { pool, io_timeout })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        // Dropping the future on expiry drops any open transaction, which rolls it back.
        tokio::time::timeout(self.io_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout(self.io_timeout))?
    }

    /// Idempotent upsert keyed by `(source, fetched_at)`.
    ///
    /// Identical content is a no-op; different content replaces the old
    /// snapshot and all of its items in one transaction.
    pub async fn put(&self, snap: &Snapshot) -> Result<PutOutcome, StoreError> {
        check_snapshot(snap)?;
        let hash = content_hash(&snap.items);
        let outcome = self.bounded(self.put_tx(snap, &hash)).await?;
        debug!(
            target: "store",
            source = %snap.source,
            fetched_at = %snap.fetched_at,
            items = snap.items.len(),
            ?outcome,
            "snapshot put"
        );
        Ok(outcome)
    }

    async fn put_tx(&self, snap: &Snapshot, hash: &str) -> Result<PutOutcome, StoreError> {
        let source = snap.source.as_str();
        let at_ms = snap.fetched_at.timestamp_millis();
        let count = snap.items.len() as i64;

        let mut tx = self.pool.begin().await?;

        // Write first so the transaction takes the write lock up front.
        let inserted = sqlx::query(
            r#"
            INSERT INTO snapshots (source, fetched_at, item_count, content_hash)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (source, fetched_at) DO NOTHING
            "#,
        )
        .bind(source)
        .bind(at_ms)
        .bind(count)
        .bind(hash)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        let outcome = if inserted {
            PutOutcome::Inserted
        } else {
            let existing: String = sqlx::query_scalar(
                "SELECT content_hash FROM snapshots WHERE source = ? AND fetched_at = ?",
            )
            .bind(source)
            .bind(at_ms)
            .fetch_one(&mut *tx)
            .await?;
            if existing == hash {
                tx.rollback().await?;
                return Ok(PutOutcome::Unchanged);
            }

            sqlx::query("DELETE FROM items WHERE source = ? AND fetched_at = ?")
                .bind(source)
                .bind(at_ms)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE snapshots SET item_count = ?, content_hash = ? WHERE source = ? AND fetched_at = ?",
            )
            .bind(count)
            .bind(hash)
            .bind(source)
            .bind(at_ms)
            .execute(&mut *tx)
            .await?;
            PutOutcome::Replaced
        };

        for it in &snap.items {
            sqlx::query(
                r#"
                INSERT INTO items (source, fetched_at, rank, title, heat, url, source_item_key)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(source)
            .bind(at_ms)
            .bind(it.rank as i64)
            .bind(&it.title)
            .bind(it.heat)
            .bind(it.url.as_deref())
            .bind(&it.source_item_key)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(outcome)
    }

    /// Most recent snapshot for `source`, if any.
    pub async fn latest(&self, source: Source) -> Result<Option<Snapshot>, StoreError> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            let at_ms: Option<i64> = sqlx::query_scalar(
                "SELECT fetched_at FROM snapshots WHERE source = ? ORDER BY fetched_at DESC LIMIT 1",
            )
            .bind(source.as_str())
            .fetch_optional(&mut *tx)
            .await?;
            let snap = match at_ms {
                Some(ms) => Some(load_snapshot(&mut tx, source, ms).await?),
                None => None,
            };
            tx.commit().await?;
            Ok::<_, StoreError>(snap)
        })
        .await
    }

    /// Snapshot stored under exactly `(source, fetched_at)`.
    pub async fn snapshot_at(
        &self,
        source: Source,
        fetched_at: DateTime<Utc>,
    ) -> Result<Option<Snapshot>, StoreError> {
        let at_ms = fetched_at.timestamp_millis();
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM snapshots WHERE source = ? AND fetched_at = ?)",
            )
            .bind(source.as_str())
            .bind(at_ms)
            .fetch_one(&mut *tx)
            .await?;
            let snap = if exists {
                Some(load_snapshot(&mut tx, source, at_ms).await?)
            } else {
                None
            };
            tx.commit().await?;
            Ok::<_, StoreError>(snap)
        })
        .await
    }

    /// Rank history of one topic. Nothing runs until the query is streamed.
    pub fn history(&self, source: Source, item_key: &str, range: TimeRange) -> HistoryQuery {
        HistoryQuery {
            pool: self.pool.clone(),
            source,
            item_key: item_key.to_string(),
            range,
        }
    }

    /// Delete snapshots (and their items) with `fetched_at < older_than`.
    pub async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        let cutoff = older_than.timestamp_millis();
        let removed = self
            .bounded(async {
                let mut tx = self.pool.begin().await?;
                sqlx::query("DELETE FROM items WHERE fetched_at < ?")
                    .bind(cutoff)
                    .execute(&mut *tx)
                    .await?;
                let removed = sqlx::query("DELETE FROM snapshots WHERE fetched_at < ?")
                    .bind(cutoff)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                tx.commit().await?;
                Ok::<_, StoreError>(removed)
            })
            .await?;
        if removed > 0 {
            info!(target: "store", removed, %older_than, "pruned snapshots");
        }
        Ok(removed)
    }

    /// Last stored snapshot time and size per source.
    pub async fn status(&self) -> Result<Vec<SourceStatus>, StoreError> {
        let rows = self
            .bounded(async {
                Ok::<_, StoreError>(sqlx::query(
                    r#"
                    SELECT s.source, s.fetched_at, s.item_count
                    FROM snapshots s
                    JOIN (SELECT source, MAX(fetched_at) AS fetched_at
                          FROM snapshots GROUP BY source) m
                      ON s.source = m.source AND s.fetched_at = m.fetched_at
                    ORDER BY s.source
                    "#,
                )
                .fetch_all(&self.pool)
                .await?)
            })
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.get("source");
            let Ok(source) = name.parse::<Source>() else {
                warn!(target: "store", source = %name, "skipping rows of unknown source");
                continue;
            };
            out.push(SourceStatus {
                source,
                last_fetched_at: millis_to_utc(row.get("fetched_at"))?,
                item_count: row.get::<i64, _>("item_count") as u32,
            });
        }
        Ok(out)
    }
}

/// Lazy, restartable description of an item-history query.
#[derive(Debug, Clone)]
pub struct HistoryQuery {
    pool: SqlitePool,
    source: Source,
    item_key: String,
    range: TimeRange,
}

impl HistoryQuery {
    /// Points ordered by `fetched_at` ascending. Each call re-runs the query.
    pub fn stream(&self) -> BoxStream<'_, Result<HistoryPoint, StoreError>> {
        if self.range.from > self.range.to {
            return stream::empty().boxed();
        }
        sqlx::query(
            r#"
            SELECT fetched_at, rank, heat
            FROM items
            WHERE source = ? AND source_item_key = ? AND fetched_at BETWEEN ? AND ?
            ORDER BY fetched_at ASC
            "#,
        )
        .bind(self.source.as_str())
        .bind(self.item_key.as_str())
        .bind(ceil_millis(self.range.from))
        .bind(self.range.to.timestamp_millis())
        .fetch(&self.pool)
        .map_err(StoreError::from)
        .and_then(|row| async move { point_from_row(&row) })
        .boxed()
    }

    pub async fn collect(&self) -> Result<Vec<HistoryPoint>, StoreError> {
        self.stream().try_collect().await
    }
}

fn point_from_row(row: &SqliteRow) -> Result<HistoryPoint, StoreError> {
    Ok(HistoryPoint {
        fetched_at: millis_to_utc(row.get("fetched_at"))?,
        rank: row.get::<i64, _>("rank") as u32,
        heat: row.get("heat"),
    })
}

async fn load_snapshot(
    conn: &mut sqlx::SqliteConnection,
    source: Source,
    at_ms: i64,
) -> Result<Snapshot, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT rank, title, heat, url, source_item_key
        FROM items
        WHERE source = ? AND fetched_at = ?
        ORDER BY rank ASC
        "#,
    )
    .bind(source.as_str())
    .bind(at_ms)
    .fetch_all(&mut *conn)
    .await?;

    let items = rows
        .into_iter()
        .map(|row| RankingItem {
            rank: row.get::<i64, _>("rank") as u32,
            title: row.get("title"),
            heat: row.get("heat"),
            url: row.get("url"),
            source_item_key: row.get("source_item_key"),
        })
        .collect();

    Ok(Snapshot {
        source,
        fetched_at: millis_to_utc(at_ms)?,
        items,
    })
}

fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Invalid(format!("fetched_at {ms} out of range")))
}

/// Unix millis rounded up, so a sub-ms lower bound excludes the ms it falls in.
fn ceil_millis(t: DateTime<Utc>) -> i64 {
    let ms = t.timestamp_millis();
    if t.timestamp_subsec_nanos() % 1_000_000 != 0 {
        ms + 1
    } else {
        ms
    }
}

fn check_snapshot(snap: &Snapshot) -> Result<(), StoreError> {
    if snap.items.is_empty() {
        return Err(StoreError::Invalid(format!(
            "{} snapshot at {} has no items",
            snap.source, snap.fetched_at
        )));
    }
    if !snap.has_contiguous_ranks() {
        let ranks: Vec<u32> = snap.items.iter().map(|i| i.rank).collect();
        return Err(StoreError::Invalid(format!(
            "{} snapshot ranks are not 1..={}: {ranks:?}",
            snap.source,
            snap.items.len()
        )));
    }
    let mut keys: Vec<&str> = snap.items.iter().map(|i| i.source_item_key.as_str()).collect();
    keys.sort_unstable();
    if keys.windows(2).any(|w| w[0] == w[1]) {
        return Err(StoreError::Invalid(format!(
            "{} snapshot repeats a source_item_key",
            snap.source
        )));
    }
    if snap.items.iter().any(|i| i.title.trim().is_empty()) {
        return Err(StoreError::Invalid(format!(
            "{} snapshot contains an empty title",
            snap.source
        )));
    }
    Ok(())
}

/// Digest of the ordered items; equal digests mean an identical snapshot body.
pub fn content_hash(items: &[RankingItem]) -> String {
    let mut h = Sha256::new();
    for it in items {
        h.update(it.rank.to_le_bytes());
        h.update(it.title.as_bytes());
        h.update([0x1f]);
        match it.heat {
            Some(v) => h.update(v.to_bits().to_le_bytes()),
            None => h.update([0u8]),
        }
        h.update([0x1f]);
        h.update(it.url.as_deref().unwrap_or_default().as_bytes());
        h.update([0x1f]);
        h.update(it.source_item_key.as_bytes());
        h.update([0x1e]);
    }
    let digest = h.finalize();
    let mut out = String::with_capacity(64);
    for b in digest.iter() {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(rank: u32, title: &str) -> RankingItem {
        RankingItem {
            rank,
            title: title.into(),
            heat: Some(1.0),
            url: None,
            source_item_key: format!("k-{title}"),
        }
    }

    #[test]
    fn content_hash_is_order_and_field_sensitive() {
        let a = vec![item(1, "A"), item(2, "B")];
        let mut b = a.clone();
        assert_eq!(content_hash(&a), content_hash(&b));
        b[1].heat = Some(2.0);
        assert_ne!(content_hash(&a), content_hash(&b));
        let swapped = vec![item(1, "B"), item(2, "A")];
        assert_ne!(content_hash(&a), content_hash(&swapped));
    }

    #[test]
    fn lower_bound_rounds_up_to_the_next_millisecond() {
        let at = DateTime::from_timestamp_millis(1_762_500_000_123).unwrap();
        assert_eq!(ceil_millis(at), 1_762_500_000_123);
        let later = at + chrono::Duration::microseconds(500);
        assert_eq!(ceil_millis(later), 1_762_500_000_124);
        assert_eq!(later.timestamp_millis(), 1_762_500_000_123);
    }

    #[test]
    fn invalid_snapshots_are_rejected_before_io() {
        let snap = Snapshot {
            source: Source::Baidu,
            fetched_at: Utc::now(),
            items: vec![item(1, "A"), item(3, "B")],
        };
        assert!(matches!(check_snapshot(&snap), Err(StoreError::Invalid(_))));

        let empty = Snapshot {
            items: vec![],
            ..snap.clone()
        };
        assert!(check_snapshot(&empty).is_err());

        let dup = Snapshot {
            items: vec![item(1, "A"), item(2, "A")],
            ..snap
        };
        assert!(check_snapshot(&dup).is_err());
    }
}

// tests/common/mod.rs
// Shared helpers: in-memory store and a scriptable adapter.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqlitePoolOptions;

use hotboard_collector::error::{FetchError, ParseError};
use hotboard_collector::ingest::config::AdapterConfig;
use hotboard_collector::ingest::normalize::title_key;
use hotboard_collector::ingest::providers::validate_ranks;
use hotboard_collector::ingest::{RawItem, RawResponse, SourceAdapter};
use hotboard_collector::model::{RankingItem, Snapshot, Source};
use hotboard_collector::store::{schema, SnapshotStore};

/// Single-connection in-memory SQLite with the schema bootstrapped.
pub async fn memory_store() -> Arc<SnapshotStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("connect in-memory sqlite");
    schema::bootstrap(&pool).await.expect("bootstrap schema");
    Arc::new(
        SnapshotStore::from_pool(pool, Duration::from_secs(5))
            .await
            .expect("open store"),
    )
}

pub fn t(h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 7, h, m, 0).unwrap()
}

pub fn items(titles: &[(&str, f64)]) -> Vec<RankingItem> {
    titles
        .iter()
        .enumerate()
        .map(|(i, (title, heat))| RankingItem {
            title: title.to_string(),
            rank: i as u32 + 1,
            heat: Some(*heat),
            url: None,
            source_item_key: title_key(title),
        })
        .collect()
}

pub fn snapshot(source: Source, at: DateTime<Utc>, titles: &[(&str, f64)]) -> Snapshot {
    Snapshot {
        source,
        fetched_at: at,
        items: items(titles),
    }
}

#[derive(Clone)]
pub enum Script {
    /// Titles ranked in the given order.
    Board(Vec<(&'static str, f64)>),
    /// Explicit ranks, validated like a real adapter would.
    Ranks(Vec<u32>),
    FetchStatus(u16),
    PanicInParse,
    /// Ignore the request timeout and hang this long.
    Hang(Duration),
}

/// Adapter whose behavior is fixed up front. Counts calls and concurrent fetches.
pub struct ScriptedAdapter {
    pub source: Source,
    pub cfg: AdapterConfig,
    pub script: Script,
    pub delay: Duration,
    pub calls: Arc<AtomicUsize>,
    pub active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
}

impl ScriptedAdapter {
    pub fn new(source: Source, script: Script) -> Self {
        Self {
            source,
            cfg: AdapterConfig::default_for(source),
            script,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.cfg.request_timeout = timeout;
        self
    }

    pub fn board(source: Source, titles: &[(&'static str, f64)]) -> Self {
        Self::new(source, Script::Board(titles.to_vec()))
    }
}

#[async_trait]
impl SourceAdapter for ScriptedAdapter {
    fn source(&self) -> Source {
        self.source
    }

    fn config(&self) -> &AdapterConfig {
        &self.cfg
    }

    async fn fetch(&self, _timeout: Duration) -> Result<RawResponse, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Script::Hang(d) = &self.script {
            tokio::time::sleep(*d).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let url = self.cfg.endpoint_url.clone();
        match &self.script {
            Script::FetchStatus(status) => Err(FetchError::Status {
                url,
                status: *status,
            }),
            _ => Ok(RawResponse {
                url,
                status: 200,
                body: String::new(),
            }),
        }
    }

    fn parse(&self, _raw: &RawResponse) -> Result<Vec<RawItem>, ParseError> {
        let items = match &self.script {
            Script::Board(titles) => titles
                .iter()
                .enumerate()
                .map(|(i, (title, heat))| RawItem {
                    rank: i as u32 + 1,
                    title: title.to_string(),
                    heat: Some(*heat),
                    url: None,
                    native_id: None,
                })
                .collect(),
            Script::Ranks(ranks) => ranks
                .iter()
                .map(|r| RawItem {
                    rank: *r,
                    title: format!("item {r}"),
                    heat: None,
                    url: None,
                    native_id: None,
                })
                .collect(),
            Script::PanicInParse => panic!("adapter blew up"),
            Script::FetchStatus(_) | Script::Hang(_) => Vec::new(),
        };
        validate_ranks(items)
    }
}

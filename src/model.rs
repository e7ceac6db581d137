//! Canonical ranking model shared by adapters, the store and the read API.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of boards we collect from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Zhihu,
    Weibo,
    Douyin,
    Baidu,
}

impl Source {
    pub const ALL: [Source; 4] = [Source::Zhihu, Source::Weibo, Source::Douyin, Source::Baidu];

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Zhihu => "zhihu",
            Source::Weibo => "weibo",
            Source::Douyin => "douyin",
            Source::Baidu => "baidu",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownSource(pub String);

impl fmt::Display for UnknownSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown source '{}'", self.0)
    }
}

impl std::error::Error for UnknownSource {}

impl FromStr for Source {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|src| src.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownSource(s.to_string()))
    }
}

/// One trending entry at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingItem {
    pub title: String,
    pub rank: u32,
    /// Platform-specific popularity; not comparable across sources.
    pub heat: Option<f64>,
    pub url: Option<String>,
    /// Stable identity of the topic within its source.
    pub source_item_key: String,
}

/// The full ranking list of one source at one poll time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub source: Source,
    pub fetched_at: DateTime<Utc>,
    /// Ordered by rank ascending; ranks are exactly 1..=len.
    pub items: Vec<RankingItem>,
}

impl Snapshot {
    /// True if ranks are exactly `1..=len` in order.
    pub fn has_contiguous_ranks(&self) -> bool {
        self.items
            .iter()
            .enumerate()
            .all(|(i, it)| it.rank as usize == i + 1)
    }
}

/// One point of an item's rank history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub fetched_at: DateTime<Utc>,
    pub rank: u32,
    pub heat: Option<f64>,
}

/// Per-source freshness, used by the dashboard to show "last updated".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub source: Source,
    pub last_fetched_at: DateTime<Utc>,
    pub item_count: u32,
}

/// Result of an idempotent upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PutOutcome {
    Inserted,
    Unchanged,
    Replaced,
}

/// Closed time interval `[from, to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn at(t: DateTime<Utc>) -> Self {
        Self { from: t, to: t }
    }
}

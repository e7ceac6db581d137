//! Error taxonomy for the collection pipeline.
//!
//! Each stage has its own error type so the coordinator can classify a failure
//! without string matching. Application glue (config, binaries) uses `anyhow`.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Network-level failure while talking to an upstream board.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error fetching {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("upstream {url} answered HTTP {status}")]
    Status { url: String, status: u16 },
}

/// The upstream payload did not have the shape the adapter expects.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected payload shape: {0}")]
    Shape(String),

    #[error("rank sequence is not 1..={expected_len}: found {found:?}")]
    RankSequence { expected_len: usize, found: Vec<u32> },

    #[error("board contained no items")]
    Empty,
}

#[derive(Debug, Error)]
pub enum NormalizationError {
    #[error("all {dropped} items were dropped during normalization")]
    AllItemsDropped { dropped: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("schema missing: table `{0}` not found (run init-db first)")]
    SchemaMissing(&'static str),

    #[error("refusing to store invalid snapshot: {0}")]
    Invalid(String),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("scheduler is already running")]
    AlreadyRunning,

    #[error("scheduler has been stopped and cannot be restarted")]
    Stopped,
}

/// Flat failure classification used in cycle reports and metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Fetch,
    Parse,
    Normalize,
    Store,
    Timeout,
    Panic,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Fetch => "fetch",
            ErrorKind::Parse => "parse",
            ErrorKind::Normalize => "normalize",
            ErrorKind::Store => "store",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Panic => "panic",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

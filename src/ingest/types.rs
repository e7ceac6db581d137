// src/ingest/types.rs
use std::time::Duration;

use crate::error::{FetchError, ParseError};
use crate::ingest::config::AdapterConfig;
use crate::model::Source;

/// Raw upstream answer, kept verbatim until `parse`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

/// One board entry as the adapter understood it, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawItem {
    pub rank: u32,
    pub title: String,
    pub heat: Option<f64>,
    pub url: Option<String>,
    /// Upstream identifier when the platform has one (e.g. Douyin `sentence_id`).
    pub native_id: Option<String>,
}

/// One upstream board. Implementations are pure fetch + parse: no retries,
/// no scheduling knowledge, no shared state.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    fn config(&self) -> &AdapterConfig;

    /// Single attempt, bounded by `timeout`.
    async fn fetch(&self, timeout: Duration) -> Result<RawResponse, FetchError>;

    /// Must return items with ranks exactly `1..=N`, or an error.
    fn parse(&self, raw: &RawResponse) -> Result<Vec<RawItem>, ParseError>;
}

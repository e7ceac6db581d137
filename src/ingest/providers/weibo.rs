// src/ingest/providers/weibo.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use super::{heat_from_json, validate_ranks, Mode};
use crate::error::{FetchError, ParseError};
use crate::ingest::config::AdapterConfig;
use crate::ingest::types::{RawItem, RawResponse, SourceAdapter};
use crate::model::Source;

const SEARCH_URL: &str = "https://s.weibo.com/weibo";

#[derive(Debug, Deserialize)]
struct Envelope {
    data: Option<Data>,
}

#[derive(Debug, Deserialize)]
struct Data {
    realtime: Option<Vec<Entry>>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    note: Option<String>,
    word: Option<String>,
    word_scheme: Option<String>,
    num: Option<Value>,
    is_ad: Option<Value>,
}

impl Entry {
    fn is_ad(&self) -> bool {
        match &self.is_ad {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
            _ => false,
        }
    }
}

/// Weibo side-panel hot search. Promoted entries are skipped; rank is the
/// position among the remaining ones.
pub struct WeiboAdapter {
    cfg: AdapterConfig,
    mode: Mode,
}

impl WeiboAdapter {
    pub fn from_config(cfg: AdapterConfig) -> Self {
        Self {
            cfg,
            mode: Mode::http(),
        }
    }

    pub fn from_fixture(body: &str) -> Self {
        Self {
            cfg: AdapterConfig::default_for(Source::Weibo),
            mode: Mode::Fixture(body.to_string()),
        }
    }
}

/// `word_scheme` sometimes arrives already percent-encoded; decode it first
/// so it is encoded exactly once.
fn search_url(query: &str) -> Option<String> {
    let decoded;
    let query = if is_percent_encoded(query) {
        let mut u = Url::parse(SEARCH_URL).ok()?;
        u.set_query(Some(&format!("q={query}")));
        decoded = u.query_pairs().find(|(k, _)| k == "q")?.1.into_owned();
        decoded.as_str()
    } else {
        query
    };
    Url::parse_with_params(SEARCH_URL, &[("q", query), ("t", "31")])
        .ok()
        .map(String::from)
}

/// True when `s` has at least one `%` and every `%` starts a `%XX` escape.
fn is_percent_encoded(s: &str) -> bool {
    let b = s.as_bytes();
    let mut seen = false;
    for (i, &c) in b.iter().enumerate() {
        if c == b'%' {
            let escape = b.get(i + 1..i + 3);
            if !escape.is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit)) {
                return false;
            }
            seen = true;
        }
    }
    seen
}

#[async_trait]
impl SourceAdapter for WeiboAdapter {
    fn source(&self) -> Source {
        Source::Weibo
    }

    fn config(&self) -> &AdapterConfig {
        &self.cfg
    }

    async fn fetch(&self, timeout: Duration) -> Result<RawResponse, FetchError> {
        self.mode
            .fetch(&self.cfg, "application/json, text/plain, */*", timeout)
            .await
    }

    fn parse(&self, raw: &RawResponse) -> Result<Vec<RawItem>, ParseError> {
        let env: Envelope = serde_json::from_str(&raw.body)?;
        let realtime = env
            .data
            .and_then(|d| d.realtime)
            .ok_or_else(|| ParseError::Shape("weibo: missing `data.realtime`".into()))?;

        let items = realtime
            .into_iter()
            .filter(|e| !e.is_ad())
            .enumerate()
            .map(|(i, e)| {
                let title = e.note.clone().or_else(|| e.word.clone()).unwrap_or_default();
                let scheme = e.word_scheme.filter(|s| !s.trim().is_empty());
                let query = scheme.clone().unwrap_or_else(|| title.trim().to_string());
                RawItem {
                    rank: i as u32 + 1,
                    heat: heat_from_json(e.num.as_ref()),
                    url: (!query.is_empty()).then(|| search_url(&query)).flatten(),
                    native_id: scheme,
                    title,
                }
            })
            .collect();
        validate_ranks(items)
    }
}

// src/ingest/providers/douyin.rs
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use super::{heat_from_json, id_from_json, validate_ranks, Mode};
use crate::error::{FetchError, ParseError};
use crate::ingest::config::AdapterConfig;
use crate::ingest::types::{RawItem, RawResponse, SourceAdapter};
use crate::model::Source;

#[derive(Debug, Deserialize)]
struct Envelope {
    data: Option<Data>,
}

#[derive(Debug, Deserialize)]
struct Data {
    word_list: Option<Vec<Word>>,
}

#[derive(Debug, Deserialize)]
struct Word {
    word: Option<String>,
    sentence_id: Option<Value>,
    hot_value: Option<Value>,
    position: Option<u32>,
}

/// Douyin web hot search list.
///
/// Order comes from the upstream `position` when every entry carries one,
/// otherwise from `hot_value` descending. Ranks are always renumbered `1..=N`.
pub struct DouyinAdapter {
    cfg: AdapterConfig,
    mode: Mode,
}

impl DouyinAdapter {
    pub fn from_config(cfg: AdapterConfig) -> Self {
        Self {
            cfg,
            mode: Mode::http(),
        }
    }

    pub fn from_fixture(body: &str) -> Self {
        Self {
            cfg: AdapterConfig::default_for(Source::Douyin),
            mode: Mode::Fixture(body.to_string()),
        }
    }
}

fn detail_url(sentence_id: &str, word: &str) -> Option<String> {
    let mut url = Url::parse("https://www.douyin.com/hot").ok()?;
    url.path_segments_mut().ok()?.push(sentence_id).push(word);
    Some(url.into())
}

struct Candidate {
    word: String,
    sentence_id: String,
    heat: Option<f64>,
    position: Option<u32>,
}

#[async_trait]
impl SourceAdapter for DouyinAdapter {
    fn source(&self) -> Source {
        Source::Douyin
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
        let words = env
            .data
            .and_then(|d| d.word_list)
            .ok_or_else(|| ParseError::Shape("douyin: missing `data.word_list`".into()))?;

        let mut candidates: Vec<Candidate> = words
            .into_iter()
            .filter_map(|w| {
                let word = w.word.filter(|s| !s.trim().is_empty())?;
                let sentence_id = id_from_json(w.sentence_id.as_ref())?;
                Some(Candidate {
                    word,
                    sentence_id,
                    heat: heat_from_json(w.hot_value.as_ref()),
                    position: w.position,
                })
            })
            .collect();

        // Skipped entries leave gaps in upstream positions; keep their order and renumber.
        let use_positions =
            !candidates.is_empty() && candidates.iter().all(|c| c.position.is_some());
        if use_positions {
            let found: Vec<u32> = candidates.iter().filter_map(|c| c.position).collect();
            candidates.sort_by_key(|c| c.position);
            if candidates.windows(2).any(|w| w[0].position == w[1].position) {
                return Err(ParseError::RankSequence {
                    expected_len: candidates.len(),
                    found,
                });
            }
        } else {
            candidates.sort_by(|a, b| b.heat.unwrap_or(0.0).total_cmp(&a.heat.unwrap_or(0.0)));
        }

        let items = candidates
            .into_iter()
            .enumerate()
            .map(|(i, c)| RawItem {
                rank: i as u32 + 1,
                url: detail_url(&c.sentence_id, &c.word),
                title: c.word,
                heat: c.heat,
                native_id: Some(c.sentence_id),
            })
            .collect();
        validate_ranks(items)
    }
}

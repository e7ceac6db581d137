// src/ingest/providers/zhihu.rs
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{heat_from_json, id_from_json, validate_ranks, Mode};
use crate::error::{FetchError, ParseError};
use crate::ingest::config::AdapterConfig;
use crate::ingest::types::{RawItem, RawResponse, SourceAdapter};
use crate::model::Source;

#[derive(Debug, Deserialize)]
struct HotList {
    data: Option<Vec<Value>>,
}

/// Zhihu hot list (`topstory/hot-list`). Rank is the position in `data`.
pub struct ZhihuAdapter {
    cfg: AdapterConfig,
    mode: Mode,
}

impl ZhihuAdapter {
    pub fn from_config(cfg: AdapterConfig) -> Self {
        Self {
            cfg,
            mode: Mode::http(),
        }
    }

    pub fn from_fixture(body: &str) -> Self {
        Self {
            cfg: AdapterConfig::default_for(Source::Zhihu),
            mode: Mode::Fixture(body.to_string()),
        }
    }

    fn parse_entry(position: usize, entry: &Value) -> RawItem {
        // Fields live under `target` for the app API and inline for the web API.
        let target = entry
            .get("target")
            .filter(|t| t.is_object())
            .unwrap_or(entry);

        let title = target
            .get("title")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let url = target
            .get("url")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .map(question_url)
            .or_else(|| {
                id_from_json(target.get("id"))
                    .map(|id| format!("https://www.zhihu.com/question/{id}"))
            });

        let heat = entry
            .get("detail_text")
            .or_else(|| entry.get("detail_texts"))
            .and_then(|v| heat_from_json(Some(v)));

        RawItem {
            rank: position as u32 + 1,
            title,
            heat,
            url,
            native_id: None,
        }
    }
}

/// `https://api.zhihu.com/questions/123` → `https://www.zhihu.com/question/123`
fn question_url(raw: &str) -> String {
    raw.replacen("://api.zhihu.com", "://www.zhihu.com", 1)
        .replacen("/questions/", "/question/", 1)
}

#[async_trait]
impl SourceAdapter for ZhihuAdapter {
    fn source(&self) -> Source {
        Source::Zhihu
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
        let list: HotList = serde_json::from_str(&raw.body)?;
        let data = list
            .data
            .ok_or_else(|| ParseError::Shape("zhihu: missing `data` array".into()))?;

        // Non-object entries keep their slot with an empty title; the normalizer drops them.
        let items = data
            .iter()
            .enumerate()
            .map(|(i, entry)| Self::parse_entry(i, entry))
            .collect();
        validate_ranks(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_api_question_urls() {
        assert_eq!(
            question_url("https://api.zhihu.com/questions/42"),
            "https://www.zhihu.com/question/42"
        );
        assert_eq!(
            question_url("https://www.zhihu.com/question/7"),
            "https://www.zhihu.com/question/7"
        );
    }

    #[test]
    fn missing_data_is_a_shape_error() {
        let a = ZhihuAdapter::from_fixture("{}");
        let raw = RawResponse {
            url: "x".into(),
            status: 200,
            body: r#"{"error": {"code": 100}}"#.into(),
        };
        assert!(matches!(a.parse(&raw), Err(ParseError::Shape(_))));
    }
}

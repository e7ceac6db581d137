// src/ingest/providers/mod.rs
//! One adapter per board plus the plumbing they share: HTTP fetch with a hard
//! timeout, heat parsing and the rank-sequence check.

pub mod baidu;
pub mod douyin;
pub mod weibo;
pub mod zhihu;

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{ACCEPT, USER_AGENT};

use crate::error::{FetchError, ParseError};
use crate::ingest::config::{AdapterConfig, CollectorConfig};
use crate::ingest::types::{RawItem, RawResponse, SourceAdapter};
use crate::model::Source;

/// Where an adapter gets its bytes from.
pub(crate) enum Mode {
    /// Canned body, served as HTTP 200. Used by tests and offline replays.
    Fixture(String),
    Http(reqwest::Client),
}

impl Mode {
    pub(crate) fn http() -> Self {
        Mode::Http(reqwest::Client::new())
    }

    pub(crate) async fn fetch(
        &self,
        cfg: &AdapterConfig,
        accept: &str,
        timeout: Duration,
    ) -> Result<RawResponse, FetchError> {
        let url = cfg.endpoint_url.clone();
        let client = match self {
            Mode::Fixture(body) => {
                return Ok(RawResponse {
                    url,
                    status: 200,
                    body: body.clone(),
                })
            }
            Mode::Http(client) => client,
        };

        let mut req = client.get(&url).header(ACCEPT, accept).timeout(timeout);
        if let Some(ua) = &cfg.user_agent {
            req = req.header(USER_AGENT, ua);
        }

        let call = async {
            let resp = req.send().await?;
            let status = resp.status();
            let body = resp.text().await?;
            Ok::<_, reqwest::Error>((status, body))
        };

        match tokio::time::timeout(timeout, call).await {
            Err(_elapsed) => Err(FetchError::Timeout { url, timeout }),
            Ok(Err(e)) if e.is_timeout() => Err(FetchError::Timeout { url, timeout }),
            Ok(Err(e)) => Err(FetchError::Transport { url, source: e }),
            Ok(Ok((status, _))) if !status.is_success() => Err(FetchError::Status {
                url,
                status: status.as_u16(),
            }),
            Ok(Ok((status, body))) => Ok(RawResponse {
                url,
                status: status.as_u16(),
                body,
            }),
        }
    }
}

/// Build the adapter for `source`.
pub fn build(source: Source, cfg: AdapterConfig) -> Arc<dyn SourceAdapter> {
    match source {
        Source::Zhihu => Arc::new(zhihu::ZhihuAdapter::from_config(cfg)),
        Source::Weibo => Arc::new(weibo::WeiboAdapter::from_config(cfg)),
        Source::Douyin => Arc::new(douyin::DouyinAdapter::from_config(cfg)),
        Source::Baidu => Arc::new(baidu::BaiduAdapter::from_config(cfg)),
    }
}

/// Adapters for every enabled source in `cfg`.
pub fn build_enabled(cfg: &CollectorConfig) -> Vec<Arc<dyn SourceAdapter>> {
    cfg.enabled_sources()
        .map(|(src, c)| build(src, c.clone()))
        .collect()
}

/// Sort by rank and require exactly `1..=N`. Anything else is a parse defect.
pub fn validate_ranks(mut items: Vec<RawItem>) -> Result<Vec<RawItem>, ParseError> {
    if items.is_empty() {
        return Err(ParseError::Empty);
    }
    let found: Vec<u32> = items.iter().map(|it| it.rank).collect();
    items.sort_by_key(|it| it.rank);
    let contiguous = items
        .iter()
        .enumerate()
        .all(|(i, it)| it.rank as usize == i + 1);
    if !contiguous {
        return Err(ParseError::RankSequence {
            expected_len: items.len(),
            found,
        });
    }
    Ok(items)
}

/// Parse a popularity figure such as `"7904613"`, `"1,234"`, `"23.5万"`,
/// `"热度 45 万"` or `"1.2亿"`.
pub fn parse_heat(s: &str) -> Option<f64> {
    static RE_NUM: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(\d+(?:\.\d+)?)\s*(万|亿)?").expect("heat regex"));

    let cleaned = s.replace([',', '，'], "");
    let caps = RE_NUM.captures(&cleaned)?;
    let base: f64 = caps.get(1)?.as_str().parse().ok()?;
    let scale = match caps.get(2).map(|m| m.as_str()) {
        Some("万") => 1e4,
        Some("亿") => 1e8,
        _ => 1.0,
    };
    let v = base * scale;
    v.is_finite().then_some(v)
}

/// Heat from a JSON value that may be a number or a (suffixed) string.
pub(crate) fn heat_from_json(v: Option<&serde_json::Value>) -> Option<f64> {
    match v? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_heat(s),
        _ => None,
    }
}

/// Identifier that may arrive as a JSON string or number.
pub(crate) fn id_from_json(v: Option<&serde_json::Value>) -> Option<String> {
    let s = match v? {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!s.is_empty()).then_some(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(rank: u32) -> RawItem {
        RawItem {
            rank,
            title: format!("t{rank}"),
            heat: None,
            url: None,
            native_id: None,
        }
    }

    #[test]
    fn heat_units() {
        assert_eq!(parse_heat("7904613"), Some(7_904_613.0));
        assert_eq!(parse_heat("1,234"), Some(1234.0));
        assert_eq!(parse_heat("23.5万"), Some(235_000.0));
        assert_eq!(parse_heat("1234 万热度"), Some(12_340_000.0));
        assert_eq!(parse_heat("1.2亿"), Some(120_000_000.0));
        assert_eq!(parse_heat("热"), None);
        assert_eq!(parse_heat(""), None);
    }

    #[test]
    fn ranks_out_of_order_are_sorted() {
        let out = validate_ranks(vec![item(2), item(1), item(3)]).unwrap();
        let ranks: Vec<u32> = out.iter().map(|i| i.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn duplicate_or_gapped_ranks_fail() {
        let err = validate_ranks(vec![item(1), item(1), item(3)]).unwrap_err();
        match err {
            ParseError::RankSequence { expected_len, found } => {
                assert_eq!(expected_len, 3);
                assert_eq!(found, vec![1, 1, 3]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(validate_ranks(vec![item(1), item(3)]).is_err());
        assert!(validate_ranks(vec![item(0), item(1)]).is_err());
        assert!(matches!(validate_ranks(vec![]), Err(ParseError::Empty)));
    }

    #[tokio::test]
    async fn fixture_mode_serves_body_as_200() {
        let cfg = AdapterConfig::default_for(Source::Baidu);
        let mode = Mode::Fixture("<html></html>".into());
        let raw = mode
            .fetch(&cfg, "text/html", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(raw.status, 200);
        assert_eq!(raw.body, "<html></html>");
        assert_eq!(raw.url, cfg.endpoint_url);
    }
}

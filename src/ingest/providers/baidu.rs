// src/ingest/providers/baidu.rs
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use super::{parse_heat, validate_ranks, Mode};
use crate::error::{FetchError, ParseError};
use crate::ingest::config::AdapterConfig;
use crate::ingest::types::{RawItem, RawResponse, SourceAdapter};
use crate::model::Source;

const BASE: &str = "https://www.baidu.com";

// Class names carry a build hash suffix (`category-wrap_iQLoo`), so match on the prefix.
static CARD: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"div[class*="category-wrap_"]"#).expect("card selector"));
static INDEX: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[class*="index_"]:not([class*="hot-index_"])"#).expect("index selector"));
static TITLE: Lazy<Selector> =
    Lazy::new(|| Selector::parse(".c-single-text-ellipsis").expect("title selector"));
static HEAT: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"[class*="hot-index_"]"#).expect("heat selector"));
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("link selector"));

/// Baidu realtime board, scraped from the rendered HTML.
pub struct BaiduAdapter {
    cfg: AdapterConfig,
    mode: Mode,
}

impl BaiduAdapter {
    pub fn from_config(cfg: AdapterConfig) -> Self {
        Self {
            cfg,
            mode: Mode::http(),
        }
    }

    pub fn from_fixture(body: &str) -> Self {
        Self {
            cfg: AdapterConfig::default_for(Source::Baidu),
            mode: Mode::Fixture(body.to_string()),
        }
    }
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

fn absolutize(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if let Some(rest) = href.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("{BASE}{href}")
    }
}

fn parse_card(position: usize, card: ElementRef<'_>) -> RawItem {
    let rank = card
        .select(&INDEX)
        .next()
        .map(text_of)
        .and_then(|t| t.parse::<u32>().ok())
        .unwrap_or(position as u32 + 1);

    let title = card.select(&TITLE).next().map(text_of).unwrap_or_default();

    let heat = card
        .select(&HEAT)
        .next()
        .map(text_of)
        .and_then(|t| parse_heat(&t));

    let url = card
        .select(&LINK)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(absolutize);

    RawItem {
        rank,
        title,
        heat,
        url,
        native_id: None,
    }
}

#[async_trait]
impl SourceAdapter for BaiduAdapter {
    fn source(&self) -> Source {
        Source::Baidu
    }

    fn config(&self) -> &AdapterConfig {
        &self.cfg
    }

    async fn fetch(&self, timeout: Duration) -> Result<RawResponse, FetchError> {
        self.mode.fetch(&self.cfg, "text/html", timeout).await
    }

    fn parse(&self, raw: &RawResponse) -> Result<Vec<RawItem>, ParseError> {
        let doc = Html::parse_document(&raw.body);
        let items: Vec<RawItem> = doc
            .select(&CARD)
            .enumerate()
            .map(|(i, card)| parse_card(i, card))
            .collect();
        if items.is_empty() {
            return Err(ParseError::Shape(
                "baidu: no `category-wrap_*` cards in page".into(),
            ));
        }
        validate_ranks(items)
    }
}

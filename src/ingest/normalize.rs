// src/ingest/normalize.rs
//! Raw board items → canonical `Snapshot`.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::NormalizationError;
use crate::ingest::types::RawItem;
use crate::model::{RankingItem, Snapshot, Source};

const TITLE_MAX_CHARS: usize = 200;

/// Snapshot plus the number of items that could not be kept.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub snapshot: Snapshot,
    pub dropped: usize,
}

/// Clean a board title: decode entities, strip tags, collapse whitespace, trim.
pub fn clean_title(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags (Weibo/Zhihu occasionally embed <em> highlights)
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, "").to_string();

    // 3) Collapse whitespace (incl. NBSP and full-width space)
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"[\s\u{00A0}\u{3000}]+").expect("ws regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 4) Length cap
    if out.chars().count() > TITLE_MAX_CHARS {
        out = out.chars().take(TITLE_MAX_CHARS).collect();
    }
    out
}

/// Case-folded form used for identity: trimmed, single-spaced, lowercase.
pub fn fold_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn hex_prefix(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Identity of a topic within its source, derived from the title.
pub fn title_key(title: &str) -> String {
    hex_prefix(&format!("title:{}", fold_title(&clean_title(title))))
}

/// Identity of a topic within its source, from an upstream id.
pub fn native_key(id: &str) -> String {
    hex_prefix(&format!("id:{}", id.trim()))
}

/// Build the snapshot for `source` at the cycle's poll time.
///
/// Items with an empty title after cleaning, or whose key already appeared at a
/// better rank, are dropped and counted; the rest are renumbered `1..=N` in
/// their original rank order.
pub fn normalize(
    source: Source,
    fetched_at: DateTime<Utc>,
    mut raw_items: Vec<RawItem>,
) -> Result<Normalized, NormalizationError> {
    raw_items.sort_by_key(|it| it.rank);

    let total = raw_items.len();
    let mut items = Vec::with_capacity(total);
    let mut seen_keys = HashSet::with_capacity(total);
    for raw in raw_items {
        let title = clean_title(&raw.title);
        if title.is_empty() {
            tracing::warn!(
                target: "ingest",
                source = %source,
                upstream_rank = raw.rank,
                "dropping item with empty title"
            );
            continue;
        }
        let source_item_key = match raw.native_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => native_key(id),
            _ => title_key(&title),
        };
        if !seen_keys.insert(source_item_key.clone()) {
            tracing::debug!(
                target: "ingest",
                source = %source,
                upstream_rank = raw.rank,
                "dropping duplicate topic"
            );
            continue;
        }
        items.push(RankingItem {
            rank: items.len() as u32 + 1,
            title,
            heat: raw.heat.filter(|h| h.is_finite()),
            url: raw
                .url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
            source_item_key,
        });
    }

    let dropped = total - items.len();
    if items.is_empty() {
        return Err(NormalizationError::AllItemsDropped { dropped });
    }

    Ok(Normalized {
        snapshot: Snapshot {
            source,
            fetched_at: truncate_to_millis(fetched_at),
            items,
        },
        dropped,
    })
}

/// The store keys snapshots by millisecond; align in-memory values with it.
pub fn truncate_to_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap_or(t)
}

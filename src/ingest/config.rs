// src/ingest/config.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::Source;

pub const ENV_PATH: &str = "COLLECTOR_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/collector.toml";

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_POLL_INTERVAL_SECS: &str = "POLL_INTERVAL_SECS";
pub const ENV_API_BIND: &str = "API_BIND";

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4 * 3600);
const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_DATABASE_URL: &str = "sqlite://hot.db";
const DEFAULT_API_BIND: &str = "127.0.0.1:8080";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.6 Safari/605.1.15";

/// Per-adapter settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterConfig {
    pub endpoint_url: String,
    pub request_timeout: Duration,
    /// Diagnostics only: logged when a parse fails so drift is attributable.
    pub schema_version: String,
    pub user_agent: Option<String>,
    pub enabled: bool,
}

impl AdapterConfig {
    /// Built-in upstream endpoint and timeout for each board.
    pub fn default_for(source: Source) -> Self {
        let (url, timeout_secs, schema) = match source {
            Source::Zhihu => (
                "https://api.zhihu.com/topstory/hot-list?limit=50&reverse_order=0",
                12,
                "topstory-hot-list",
            ),
            Source::Weibo => (
                "https://weibo.com/ajax/side/hotSearch",
                15,
                "ajax-side-hotsearch",
            ),
            Source::Douyin => (
                "https://www.douyin.com/aweme/v1/web/hot/search/list/?device_platform=webapp&aid=6383&channel=channel_pc_web&detail_list=1",
                20,
                "web-hot-search-list",
            ),
            Source::Baidu => (
                "https://top.baidu.com/board?tab=realtime",
                10,
                "board-realtime-html",
            ),
        };
        Self {
            endpoint_url: url.to_string(),
            request_timeout: Duration::from_secs(timeout_secs),
            schema_version: schema.to_string(),
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorConfig {
    pub database_url: String,
    pub poll_interval: Duration,
    /// Snapshots older than `now - horizon` are pruned after each cycle. Off when `None`.
    pub retention_horizon: Option<Duration>,
    pub store_timeout: Duration,
    pub api_bind: String,
    pub sources: BTreeMap<Source, AdapterConfig>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            retention_horizon: None,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            api_bind: DEFAULT_API_BIND.to_string(),
            sources: Source::ALL
                .into_iter()
                .map(|s| (s, AdapterConfig::default_for(s)))
                .collect(),
        }
    }
}

impl CollectorConfig {
    pub fn enabled_sources(&self) -> impl Iterator<Item = (Source, &AdapterConfig)> {
        self.sources
            .iter()
            .filter(|(_, c)| c.enabled)
            .map(|(s, c)| (*s, c))
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            bail!("poll_interval_secs must be > 0");
        }
        if self.store_timeout.is_zero() {
            bail!("store_timeout_secs must be > 0");
        }
        for (src, c) in &self.sources {
            if c.request_timeout.is_zero() {
                bail!("sources.{src}.request_timeout_secs must be > 0");
            }
            if c.endpoint_url.trim().is_empty() {
                bail!("sources.{src}.endpoint_url must not be empty");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    database_url: Option<String>,
    poll_interval_secs: Option<u64>,
    retention_horizon_secs: Option<u64>,
    store_timeout_secs: Option<u64>,
    api_bind: Option<String>,
    #[serde(default)]
    sources: BTreeMap<String, FileSource>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSource {
    endpoint_url: Option<String>,
    request_timeout_secs: Option<u64>,
    schema_version: Option<String>,
    user_agent: Option<String>,
    enabled: Option<bool>,
}

/// Parse TOML content and merge it onto the built-in defaults.
pub fn parse_config(s: &str) -> Result<CollectorConfig> {
    let file: FileConfig = toml::from_str(s).context("parsing collector config TOML")?;
    let mut cfg = CollectorConfig::default();

    if let Some(v) = file.database_url {
        cfg.database_url = v;
    }
    if let Some(v) = file.poll_interval_secs {
        cfg.poll_interval = Duration::from_secs(v);
    }
    if let Some(v) = file.retention_horizon_secs {
        // 0 means "keep everything"
        cfg.retention_horizon = (v > 0).then(|| Duration::from_secs(v));
    }
    if let Some(v) = file.store_timeout_secs {
        cfg.store_timeout = Duration::from_secs(v);
    }
    if let Some(v) = file.api_bind {
        cfg.api_bind = v;
    }

    for (name, fs) in file.sources {
        let source: Source = name
            .parse()
            .map_err(|e| anyhow!("[sources.{name}]: {e}"))?;
        let entry = cfg
            .sources
            .entry(source)
            .or_insert_with(|| AdapterConfig::default_for(source));
        if let Some(v) = fs.endpoint_url {
            entry.endpoint_url = v;
        }
        if let Some(v) = fs.request_timeout_secs {
            entry.request_timeout = Duration::from_secs(v);
        }
        if let Some(v) = fs.schema_version {
            entry.schema_version = v;
        }
        if let Some(v) = fs.user_agent {
            entry.user_agent = (!v.trim().is_empty()).then_some(v);
        }
        if let Some(v) = fs.enabled {
            entry.enabled = v;
        }
    }

    cfg.validate()?;
    Ok(cfg)
}

/// Load configuration from an explicit path (no env overrides).
pub fn load_from(path: &Path) -> Result<CollectorConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading collector config from {}", path.display()))?;
    parse_config(&content)
}

/// Load configuration using env var + fallbacks, then apply env overrides:
/// 1) $COLLECTOR_CONFIG_PATH
/// 2) config/collector.toml
/// 3) built-in defaults
pub fn load_default() -> Result<CollectorConfig> {
    let mut cfg = if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if !pb.exists() {
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
        load_from(&pb)?
    } else {
        let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
        if default_p.exists() {
            load_from(&default_p)?
        } else {
            CollectorConfig::default()
        }
    };
    apply_env_overrides(&mut cfg)?;
    Ok(cfg)
}

/// `DATABASE_URL`, `POLL_INTERVAL_SECS` and `API_BIND` win over the file.
pub fn apply_env_overrides(cfg: &mut CollectorConfig) -> Result<()> {
    if let Ok(v) = std::env::var(ENV_DATABASE_URL) {
        if !v.trim().is_empty() {
            cfg.database_url = v;
        }
    }
    if let Ok(v) = std::env::var(ENV_POLL_INTERVAL_SECS) {
        let secs: u64 = v
            .trim()
            .parse()
            .with_context(|| format!("{ENV_POLL_INTERVAL_SECS}='{v}' is not a number"))?;
        cfg.poll_interval = Duration::from_secs(secs);
    }
    if let Ok(v) = std::env::var(ENV_API_BIND) {
        if !v.trim().is_empty() {
            cfg.api_bind = v;
        }
    }
    cfg.validate()
}

// tests/ingest_config.rs
use std::path::Path;
use std::time::Duration;
use std::{env, fs};

use hotboard_collector::ingest::config::{
    load_default, load_from, ENV_API_BIND, ENV_DATABASE_URL, ENV_PATH, ENV_POLL_INTERVAL_SECS,
};
use hotboard_collector::model::Source;

fn clear_env() {
    for key in [ENV_PATH, ENV_DATABASE_URL, ENV_POLL_INTERVAL_SECS, ENV_API_BIND] {
        env::remove_var(key);
    }
}

#[test]
fn load_from_reads_a_toml_file() {
    let dir = tempfile::tempdir().unwrap();
    let p = dir.path().join("collector.toml");
    fs::write(
        &p,
        r#"
database_url = "sqlite://boards.db"
store_timeout_secs = 5

[sources.douyin]
user_agent = ""
schema_version = "web-hot-search-list-v2"
"#,
    )
    .unwrap();

    let cfg = load_from(&p).unwrap();
    assert_eq!(cfg.database_url, "sqlite://boards.db");
    assert_eq!(cfg.store_timeout, Duration::from_secs(5));
    let douyin = &cfg.sources[&Source::Douyin];
    assert_eq!(douyin.user_agent, None);
    assert_eq!(douyin.schema_version, "web-hot-search-list-v2");

    fs::write(&p, "poll_every = 10").unwrap();
    assert!(load_from(&p).is_err(), "unknown keys are rejected");
}

#[test]
fn shipped_config_keeps_every_snapshot() {
    let p = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/collector.toml");
    let cfg = load_from(&p).unwrap();
    assert_eq!(cfg.retention_horizon, None);
    assert_eq!(cfg.poll_interval, Duration::from_secs(4 * 3600));
}

#[serial_test::serial]
#[test]
fn default_uses_env_then_fallbacks_then_overrides() {
    // Isolate the CWD so the repo's own config/ is not picked up.
    let old = env::current_dir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    env::set_current_dir(tmp.path()).unwrap();
    clear_env();

    // 1) Nothing on disk: built-in defaults
    let cfg = load_default().unwrap();
    assert_eq!(cfg.poll_interval, Duration::from_secs(4 * 3600));
    assert_eq!(cfg.database_url, "sqlite://hot.db");

    // 2) Fallback file in ./config/
    let cfg_dir = tmp.path().join("config");
    fs::create_dir_all(&cfg_dir).unwrap();
    fs::write(cfg_dir.join("collector.toml"), "poll_interval_secs = 600").unwrap();
    assert_eq!(load_default().unwrap().poll_interval, Duration::from_secs(600));

    // 3) Env path wins over the fallback
    let p_env = tmp.path().join("elsewhere.toml");
    fs::write(&p_env, "poll_interval_secs = 900\n[sources.weibo]\nenabled = false").unwrap();
    env::set_var(ENV_PATH, p_env.display().to_string());
    let cfg = load_default().unwrap();
    assert_eq!(cfg.poll_interval, Duration::from_secs(900));
    assert!(!cfg.sources[&Source::Weibo].enabled);

    // 4) Env overrides win over the file
    env::set_var(ENV_POLL_INTERVAL_SECS, "60");
    env::set_var(ENV_DATABASE_URL, "sqlite::memory:");
    env::set_var(ENV_API_BIND, "0.0.0.0:9000");
    let cfg = load_default().unwrap();
    assert_eq!(cfg.poll_interval, Duration::from_secs(60));
    assert_eq!(cfg.database_url, "sqlite::memory:");
    assert_eq!(cfg.api_bind, "0.0.0.0:9000");

    env::set_var(ENV_POLL_INTERVAL_SECS, "soon");
    assert!(load_default().is_err());

    // 5) A dangling env path is an error, not a silent fallback
    env::set_var(ENV_PATH, tmp.path().join("missing.toml").display().to_string());
    env::remove_var(ENV_POLL_INTERVAL_SECS);
    assert!(load_default().is_err());

    clear_env();
    env::set_current_dir(&old).unwrap();
}

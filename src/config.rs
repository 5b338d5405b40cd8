use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;
use url::Url;

const DEFAULT_CONFIG_PATH: &str = "scraper.json";

/// Runtime configuration. Loaded from a JSON file when one exists,
/// otherwise every field falls back to the defaults below; CLI flags
/// override individual fields after loading.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listing-site root the crawl starts from.
    pub base_url: String,
    /// One crawl session is spawned per term.
    pub search_terms: Vec<String>,
    /// JSON snapshot of every post ever persisted.
    pub snapshot_path: PathBuf,
    /// SQLite database for the relational sink.
    pub db_path: PathBuf,
    /// Source-site identifier stored with every row.
    pub website_id: i64,
    /// Posted-status flag stored with every row. The source never exposes a
    /// real status signal, so this stays a configurable constant.
    pub posted_flag: String,
    /// Per-navigation timeout in seconds.
    pub navigation_timeout_secs: u64,
    /// Short timeout for the best-effort cookie-consent click.
    pub consent_timeout_secs: u64,
    /// Timeout for the listing container to become visible.
    pub container_timeout_secs: u64,
    /// Defensive cap on pages per term; the missing next-page link is the
    /// normal terminator.
    pub max_pages: usize,
    /// Cap on concurrently running sessions.
    pub max_concurrent_sessions: usize,
    pub headless: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "https://www.fish4.co.uk/".into(),
            search_terms: vec![
                "Software Developer".into(),
                "Project Manager".into(),
                "Data Analyst".into(),
                "Software Tester".into(),
            ],
            snapshot_path: PathBuf::from("data/fish4jobs.json"),
            db_path: PathBuf::from("data/jobs.sqlite"),
            website_id: 12,
            posted_flag: "Yes".into(),
            navigation_timeout_secs: 120,
            consent_timeout_secs: 10,
            container_timeout_secs: 60,
            max_pages: 50,
            max_concurrent_sessions: 4,
            headless: true,
        }
    }
}

impl Config {
    /// Load configuration. An explicit path must exist and parse; the
    /// default path fails soft to `Config::default()` when absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        let cfg = match std::fs::read_to_string(&path) {
            Ok(raw) => {
                let cfg: Config = serde_json::from_str(&raw)
                    .with_context(|| format!("invalid config file {}", path.display()))?;
                info!("Loaded config from {}", path.display());
                cfg
            }
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read config {}", path.display()))
            }
        };

        Url::parse(&cfg.base_url)
            .with_context(|| format!("base_url is not a valid URL: {}", cfg.base_url))?;
        Ok(cfg)
    }
}

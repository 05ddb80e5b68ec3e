use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::feed::SelectionMethod;
use crate::models::{DefaultView, SortKey};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Fetched before every batch; a failure aborts the whole cycle.
    #[serde(default = "default_probe_url")]
    pub probe_url: String,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_cycle_deadline")]
    pub cycle_deadline_secs: u64,

    #[serde(default)]
    pub selection: SelectionMethod,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    #[serde(default)]
    pub default_sort: SortKey,

    #[serde(default)]
    pub default_view: DefaultView,

    #[serde(default = "default_staging_ttl")]
    pub staging_ttl_hours: i64,

    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_minutes: u32,

    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Run a full metadata recompute every n scheduled cycles.
    #[serde(default = "default_reconcile_every")]
    pub reconcile_every: u32,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_db_path() -> String {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rss-corpus");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join("corpus.db").to_string_lossy().to_string()
}

fn default_user_agent() -> String {
    "rss-corpus/1.0 (+feed ingestion)".to_string()
}

fn default_probe_url() -> String {
    "https://www.example.com/".to_string()
}

fn default_concurrency() -> usize {
    120
}

fn default_request_timeout() -> u64 {
    3
}

fn default_cycle_deadline() -> u64 {
    600
}

fn default_batch_size() -> usize {
    50
}

fn default_page_limit() -> u32 {
    100
}

fn default_staging_ttl() -> i64 {
    24
}

fn default_refresh_interval() -> u32 {
    30
}

fn default_workers() -> usize {
    2
}

fn default_reconcile_every() -> u32 {
    12
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            probe_url: default_probe_url(),
            concurrency: default_concurrency(),
            request_timeout_secs: default_request_timeout(),
            cycle_deadline_secs: default_cycle_deadline(),
            selection: SelectionMethod::default(),
            batch_size: default_batch_size(),
            page_limit: default_page_limit(),
            default_sort: SortKey::default(),
            default_view: DefaultView::default(),
            staging_ttl_hours: default_staging_ttl(),
            refresh_interval_minutes: default_refresh_interval(),
            workers: default_workers(),
            reconcile_every: default_reconcile_every(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(config_path)?;
            Ok(config)
        }
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(AppError::Config("concurrency must be at least 1".to_string()));
        }
        if self.page_limit == 0 {
            return Err(AppError::Config("page_limit must be at least 1".to_string()));
        }
        if self.workers == 0 {
            return Err(AppError::Config("workers must be at least 1".to_string()));
        }
        url::Url::parse(&self.probe_url)
            .map_err(|e| AppError::Config(format!("invalid probe_url: {}", e)))?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn cycle_deadline(&self) -> Duration {
        Duration::from_secs(self.cycle_deadline_secs)
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rss-corpus")
            .join("config.toml")
    }
}

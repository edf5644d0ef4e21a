use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_archive_dir")]
    pub archive_dir: String,

    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Concurrent archive writes within one feed pass.
    #[serde(default = "default_archive_concurrency")]
    pub archive_concurrency: usize,

    /// Concurrent feed passes during ingest-all.
    #[serde(default = "default_feed_concurrency")]
    pub feed_concurrency: usize,
}

fn data_dir() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feed-archiver");
    std::fs::create_dir_all(&data_dir).ok();
    data_dir
}

fn default_db_path() -> String {
    data_dir().join("registry.db").to_string_lossy().to_string()
}

fn default_archive_dir() -> String {
    data_dir().join("archive").to_string_lossy().to_string()
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_archive_concurrency() -> usize {
    5
}

fn default_feed_concurrency() -> usize {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            archive_dir: default_archive_dir(),
            fetch_timeout_secs: default_fetch_timeout(),
            archive_concurrency: default_archive_concurrency(),
            feed_concurrency: default_feed_concurrency(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config =
                toml::from_str(&content).map_err(|e| AppError::Config(e.to_string()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| AppError::Config(e.to_string()))?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("feed-archiver")
            .join("config.toml")
    }
}

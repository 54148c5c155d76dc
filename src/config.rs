//! Configuration loading
//!
//! Resolution order for the config file:
//! 1. `--config` command-line argument
//! 2. `HOUSEBROWSE_CONFIG` environment variable
//! 3. `./housebrowse.toml`
//! 4. `<config dir>/housebrowse/config.toml`
//!
//! With no file found, compiled defaults are used.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::{Error, Result},
    load::Source,
};

pub const CONFIG_ENV: &str = "HOUSEBROWSE_CONFIG";
pub const LOCAL_CONFIG: &str = "housebrowse.toml";
pub const DATASET_URL: &str = "https://github.com/yyy1029/House-Browse/releases/download/v1.0/HouseTS.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tried in order; paths or http(s) URLs.
    pub sources: Vec<String>,
    pub cache_ttl_secs: u64,
    /// Year the composite index is anchored to.
    pub base_year: u32,
    /// Default tracing filter, overridden by `RUST_LOG`.
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: vec![
                "design2/HouseTS.csv".to_owned(),
                "HouseTS.csv".to_owned(),
                DATASET_URL.to_owned(),
            ],
            cache_ttl_secs: 60 * 60 * 24,
            base_year: 2012,
            log_level: "info".to_owned(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.iter().all(|s| s.trim().is_empty()) {
            return Err(Error::Config("at least one data source is required".to_owned()));
        }
        Ok(())
    }

    pub fn sources(&self) -> Vec<Source> {
        self.sources
            .iter()
            .filter(|s| !s.trim().is_empty())
            .map(|s| Source::parse(s))
            .collect()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("housebrowse").join("config.toml"))
}

/// First existing config file by priority. An explicit argument is returned
/// even if it does not exist so the caller can report it.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = cli_arg {
        return Some(p.to_path_buf());
    }
    if let Ok(p) = std::env::var(CONFIG_ENV) {
        if !p.trim().is_empty() {
            return Some(PathBuf::from(p));
        }
    }
    let local = PathBuf::from(LOCAL_CONFIG);
    if local.exists() {
        return Some(local);
    }
    user_config_file().filter(|p| p.exists())
}

pub fn load_config(cli_arg: Option<&Path>) -> Result<Config> {
    match resolve_config_path(cli_arg) {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!("config file not found: {}", path.display())));
            }
            info!("Loading configuration from {}", path.display());
            Config::load_file(&path)
        }
        None => {
            info!("No configuration file found, using defaults");
            Ok(Config::default())
        }
    }
}

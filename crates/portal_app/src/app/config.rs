//! Application configuration: an optional RON file plus environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use portal_core::PROFILE_ENV_VAR;
use portal_engine::{CrawlSettings, DEFAULT_LOG_TAIL};
use serde::{Deserialize, Serialize};

pub const CONFIG_ENV_VAR: &str = "PORTAL_CONFIG";
pub const URL_ENV_VAR: &str = "AGENT_URL";
pub const DEFAULT_CONFIG_FILE: &str = "portal.ron";
pub const DEFAULT_AGENT_URL: &str = "https://learn.uwaterloo.ca";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Persistent browser profile guarded by the session lock.
    pub profile_dir: PathBuf,
    /// Portal page used when a command names no URL.
    pub default_url: String,
    pub crawl: CrawlSettings,
    /// Worker output lines kept for failure reports.
    pub log_tail: usize,
    /// Where the last result is kept.
    pub state_dir: PathBuf,
    pub log_level: String,
    pub log_file: PathBuf,
    /// File this configuration was read from, if any.
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile_dir: PathBuf::from(".browser-profile"),
            default_url: DEFAULT_AGENT_URL.to_string(),
            crawl: CrawlSettings::default(),
            log_tail: DEFAULT_LOG_TAIL,
            state_dir: PathBuf::from("."),
            log_level: "info".to_string(),
            log_file: PathBuf::from(engine_logging::DEFAULT_LOG_FILE),
            source: None,
        }
    }
}

impl AppConfig {
    /// Loads `explicit` (which must exist) or `./portal.ron` (which may not),
    /// then applies environment overrides.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with(explicit, |key| std::env::var(key).ok())
    }

    pub fn load_with(
        explicit: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<Self> {
        let path = explicit.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);
        let mut config = if path.is_file() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("cannot read config {}", path.display()))?;
            let mut config: AppConfig = ron::from_str(&text)
                .with_context(|| format!("invalid config {}", path.display()))?;
            config.source = Some(path);
            config
        } else if explicit.is_some() {
            bail!("config file {} not found", path.display());
        } else {
            AppConfig::default()
        };
        config.apply_env(env);
        Ok(config)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        let set = |key: &str| env(key).filter(|value| !value.trim().is_empty());
        if let Some(profile) = set(PROFILE_ENV_VAR) {
            self.profile_dir = PathBuf::from(profile);
        }
        if let Some(url) = set(URL_ENV_VAR) {
            self.default_url = url;
        }
    }
}

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub nightscout: NightscoutConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

/// Where the device-status feed comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NightscoutConfig {
    /// Site root, e.g. `https://my-site.herokuapp.com`. Empty until the user
    /// fills it in.
    #[serde(default)]
    pub base_url: String,
    /// API secret token, appended as `?token=` when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Number of device-status records requested per fetch.
    #[serde(default = "default_count")]
    pub count: u32,
    /// Transport-level timeout. The refresh engine itself imposes none.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// JSON file holding the persisted enabled flag.
    #[serde(default = "default_settings_file")]
    pub settings_file: PathBuf,
    /// Report "app became active" right after startup.
    #[serde(default = "default_start_active")]
    pub start_active: bool,
}

impl Default for NightscoutConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            count: default_count(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            settings_file: default_settings_file(),
            start_active: default_start_active(),
        }
    }
}

fn default_count() -> u32 {
    5
}

fn default_request_timeout_secs() -> u64 {
    20
}

fn default_settings_file() -> PathBuf {
    platform::data_dir().join("settings.json")
}

fn default_start_active() -> bool {
    true
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Read `path`, writing the defaults there first if it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

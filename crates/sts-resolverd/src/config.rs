//! YAML configuration, following the `serde(default = "...")`-heavy style
//! of `EsmtpListenerParams` in `kumod::smtp_server`.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8461
}

fn default_cache_type() -> String {
    "internal".to_string()
}

fn default_cache_size() -> usize {
    10_000
}

fn default_timeout_secs() -> u64 {
    4
}

fn default_strict_testing() -> bool {
    false
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub default_zone: ZoneConfig,
    #[serde(default)]
    pub zones: BTreeMap<String, ZoneConfig>,
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cache: CacheConfig::default(),
            default_zone: ZoneConfig::default(),
            zones: BTreeMap::new(),
            log: LogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_type")]
    pub r#type: String,
    #[serde(default)]
    pub options: CacheOptions,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            r#type: default_cache_type(),
            options: CacheOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheOptions {
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            cache_size: default_cache_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ZoneConfig {
    #[serde(default = "default_timeout_secs", with = "humantime_secs")]
    pub timeout: Duration,
    #[serde(default = "default_strict_testing")]
    pub strict_testing: bool,
}

impl Default for ZoneConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(default_timeout_secs()),
            strict_testing: default_strict_testing(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
#[clap(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub dir: Option<std::path::PathBuf>,
    #[serde(default)]
    pub filter: Option<String>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let data = std::fs::read_to_string(path)
            .map_err(|err| anyhow::anyhow!("reading config file {}: {err}", path.display()))?;
        let config: Config = serde_yaml::from_str(&data)
            .map_err(|err| anyhow::anyhow!("parsing config file {}: {err}", path.display()))?;
        Ok(config)
    }
}

/// Deserializes a plain integer number of seconds into a `Duration`, the
/// way the rest of the config expresses timeouts.
mod humantime_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

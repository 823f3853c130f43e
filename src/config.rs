use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::dwell;
use crate::feed;

const DEFAULT_ENV_PREFIX: &str = "WALLFEED";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub interstitial: InterstitialConfig,
}

impl Config {
    pub fn feed_config(&self) -> feed::Config {
        feed::Config {
            lookahead: self.feed.lookahead,
            batch_size: self.feed.batch_size,
            prefetch_margin: self.feed.prefetch_margin,
            cadence: self.feed.cadence,
        }
    }

    pub fn dwell_policy(&self) -> dwell::Policy {
        dwell::Policy {
            duration: self.interstitial.dwell,
            visibility_threshold: self.interstitial.visibility_threshold,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CatalogConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedConfig {
    #[serde(default = "default_lookahead")]
    pub lookahead: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_prefetch_margin")]
    pub prefetch_margin: usize,
    #[serde(default = "default_cadence")]
    pub cadence: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            lookahead: default_lookahead(),
            batch_size: default_batch_size(),
            prefetch_margin: default_prefetch_margin(),
            cadence: default_cadence(),
        }
    }
}

fn default_lookahead() -> usize {
    4
}

fn default_batch_size() -> usize {
    3
}

fn default_prefetch_margin() -> usize {
    2
}

fn default_cadence() -> usize {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InterstitialConfig {
    #[serde(default = "default_dwell", with = "humantime_serde")]
    pub dwell: Duration,
    #[serde(default = "default_visibility_threshold")]
    pub visibility_threshold: f32,
}

impl Default for InterstitialConfig {
    fn default() -> Self {
        Self {
            dwell: default_dwell(),
            visibility_threshold: default_visibility_threshold(),
        }
    }
}

fn default_dwell() -> Duration {
    Duration::from_secs(5)
}

fn default_visibility_threshold() -> f32 {
    0.5
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            cfg = read_config_file(path)?;
        }
    } else if let Some(default_path) = default_config_path() {
        if default_path.exists() {
            cfg = read_config_file(&default_path)?;
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let mut map: HashMap<String, String> = HashMap::new();
    let upper_prefix = format!("{}_", prefix.to_uppercase());

    for (key, value) in env::vars() {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            map.insert(normalized, value);
        }
    }

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "catalog.path" => cfg.catalog.path = Some(PathBuf::from(value)),
        "feed.lookahead" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.lookahead = parsed;
            }
        }
        "feed.batch_size" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.batch_size = parsed;
            }
        }
        "feed.prefetch_margin" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.prefetch_margin = parsed;
            }
        }
        "feed.cadence" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.feed.cadence = parsed;
            }
        }
        "interstitial.dwell" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.interstitial.dwell = duration;
            }
        }
        "interstitial.visibility_threshold" => {
            if let Ok(parsed) = value.parse::<f32>() {
                cfg.interstitial.visibility_threshold = parsed.clamp(0.0, 1.0);
            }
        }
        _ => {
            tracing::debug!(key, "ignoring unknown config override");
        }
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("wallfeed").join("config.yaml"))
}

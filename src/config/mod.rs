use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::VariantSize;

/// Folder layout, variant sizes and housekeeping timers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub cache_root: PathBuf,
    pub mobile_root: PathBuf,
    pub index_root: PathBuf,
    pub catalog_path: PathBuf,
    pub thumb_size: u32,
    pub small_size: u32,
    pub full_size: u32,
    /// Tag names never attached to a photo, compared case-insensitively
    pub noise_tags: Vec<String>,
    /// Glob patterns skipped while walking the index root
    pub index_skip_patterns: Vec<String>,
    pub sweep_interval_secs: u64,
    pub upload_max_age_secs: u64,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Load a JSON config file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {:?}", path))?;
        Ok(config.with_env_overrides())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(value) = env::var("SHOEBOX_CACHE_ROOT") {
            self.cache_root = PathBuf::from(value);
        }
        if let Ok(value) = env::var("SHOEBOX_MOBILE_ROOT") {
            self.mobile_root = PathBuf::from(value);
        }
        if let Ok(value) = env::var("SHOEBOX_INDEX_ROOT") {
            self.index_root = PathBuf::from(value);
        }
        if let Ok(value) = env::var("SHOEBOX_CATALOG") {
            self.catalog_path = PathBuf::from(value);
        }
        self.thumb_size = env_number("SHOEBOX_THUMB_SIZE", self.thumb_size);
        self.small_size = env_number("SHOEBOX_SMALL_SIZE", self.small_size);
        self.full_size = env_number("SHOEBOX_FULL_SIZE", self.full_size);
        if let Ok(value) = env::var("SHOEBOX_NOISE_TAGS") {
            self.noise_tags = split_list(&value);
        }
        if let Ok(value) = env::var("SHOEBOX_INDEX_SKIP") {
            self.index_skip_patterns = split_list(&value);
        }
        self.sweep_interval_secs = env_number("SHOEBOX_SWEEP_INTERVAL", self.sweep_interval_secs);
        self.upload_max_age_secs = env_number("SHOEBOX_UPLOAD_MAX_AGE", self.upload_max_age_secs);
        self
    }

    pub fn size_for(&self, size: VariantSize) -> u32 {
        match size {
            VariantSize::Thumb => self.thumb_size,
            VariantSize::Small => self.small_size,
            VariantSize::Full => self.full_size,
        }
    }

    pub fn is_noise_tag(&self, tag: &str) -> bool {
        self.noise_tags.iter().any(|n| n.eq_ignore_ascii_case(tag))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn upload_max_age(&self) -> Duration {
        Duration::from_secs(self.upload_max_age_secs)
    }

    /// Point every folder at a subdirectory of `base`
    pub fn rooted_at(base: &Path) -> Self {
        Self {
            cache_root: base.join("cache"),
            mobile_root: base.join("mobile"),
            index_root: base.join("library"),
            catalog_path: base.join("catalog.json"),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_root: PathBuf::from("cache"),
            mobile_root: PathBuf::from("mobile"),
            index_root: PathBuf::from("library"),
            catalog_path: PathBuf::from("catalog.json"),
            thumb_size: 256,
            small_size: 1024,
            full_size: 2048,
            noise_tags: vec!["null".to_string()],
            index_skip_patterns: vec!["**/.*".to_string(), "**/@eaDir/**".to_string()],
            sweep_interval_secs: 5 * 60,
            upload_max_age_secs: 15 * 60,
        }
    }
}

fn env_number<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

//! Layered configuration.
//!
//! Sources, later wins: built-in defaults, `config.json` in the config
//! directory (`~/.sidekick` unless overridden), then environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::api::{DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS};
use crate::patch::MatcherTuning;
use crate::sync::DEFAULT_MAX_ANCESTOR_DEPTH;

pub const CONFIG_DIR_NAME: &str = ".sidekick";
pub const CONFIG_FILE_NAME: &str = "config.json";

pub const ENV_GITHUB_API_URL: &str = "SIDEKICK_GITHUB_API_URL";
pub const ENV_MAX_ANCESTOR_DEPTH: &str = "SIDEKICK_MAX_ANCESTOR_DEPTH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub github_api_url: String,
    pub request_timeout_secs: u64,
    pub default_remote: String,
    /// Remote commits examined when looking for shared history
    pub max_ancestor_depth: usize,
    pub matcher: MatcherTuning,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github_api_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            default_remote: "origin".to_string(),
            max_ancestor_depth: DEFAULT_MAX_ANCESTOR_DEPTH,
            matcher: MatcherTuning::default(),
        }
    }
}

/// `--config-dir` if given, otherwise `~/.sidekick`.
pub fn config_dir(custom: Option<&str>) -> Result<PathBuf> {
    match custom {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => Ok(dirs::home_dir()
            .context("Could not determine home directory")?
            .join(CONFIG_DIR_NAME)),
    }
}

impl Config {
    /// Load from `dir` and apply environment overrides. A missing file
    /// yields the defaults; a malformed one is an error.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut config = Self::from_file(&dir.join(CONFIG_FILE_NAME))?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var(ENV_GITHUB_API_URL).filter(|v| !v.trim().is_empty()) {
            debug!("Using GitHub API URL from {}", ENV_GITHUB_API_URL);
            self.github_api_url = url.trim().to_string();
        }
        if let Some(raw) = var(ENV_MAX_ANCESTOR_DEPTH) {
            match raw.trim().parse::<usize>() {
                Ok(depth) => self.max_ancestor_depth = depth,
                Err(_) => warn!(
                    "Ignoring {}={:?}: not a non-negative integer",
                    ENV_MAX_ANCESTOR_DEPTH, raw
                ),
            }
        }
    }
}

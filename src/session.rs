//! Credential storage for the GitHub access token.
//!
//! The token lives in `<config dir>/session.json`. `GITHUB_TOKEN` and
//! `GH_TOKEN` take precedence over the file, in that order.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::vcs::CredentialProvider;

pub const SESSION_FILE_NAME: &str = "session.json";

/// Environment variables checked, in order, before the session file.
pub const TOKEN_ENV_VARS: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];

/// Session data stored in session.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub access_token: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Where the active token came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Env(&'static str),
    File(PathBuf),
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Env(var) => write!(f, "{} environment variable", var),
            TokenSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Token store backed by session.json.
pub struct SessionStore {
    session_path: PathBuf,
    env: fn(&str) -> Option<String>,
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

impl SessionStore {
    /// Create a store in `dir`, creating the directory if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory: {:?}", dir))?;

        Ok(Self {
            session_path: dir.join(SESSION_FILE_NAME),
            env: process_env,
        })
    }

    #[cfg(test)]
    fn with_env(mut self, env: fn(&str) -> Option<String>) -> Self {
        self.env = env;
        self
    }

    pub fn session_path(&self) -> &Path {
        &self.session_path
    }

    /// The active token and its source, if any.
    pub fn token(&self) -> Option<(String, TokenSource)> {
        for var in TOKEN_ENV_VARS {
            if let Some(token) = (self.env)(var).filter(|t| !t.trim().is_empty()) {
                debug!("Using token from {}", var);
                return Some((token.trim().to_string(), TokenSource::Env(var)));
            }
        }

        match self.load() {
            Ok(Some(session)) => Some((
                session.access_token,
                TokenSource::File(self.session_path.clone()),
            )),
            Ok(None) => None,
            Err(e) => {
                warn!("Ignoring unreadable session file: {:#}", e);
                None
            }
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.token().is_some()
    }

    /// The stored session, ignoring environment overrides.
    pub fn load(&self) -> Result<Option<SessionData>> {
        if !self.session_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&self.session_path)
            .with_context(|| format!("Failed to read session file: {:?}", self.session_path))?;
        let session: SessionData = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {:?}", self.session_path))?;

        if session.access_token.trim().is_empty() {
            warn!("Session file has an empty token");
            return Ok(None);
        }
        Ok(Some(session))
    }

    pub fn save(&self, access_token: &str) -> Result<()> {
        let session = SessionData {
            access_token: access_token.trim().to_string(),
            created_at: Some(Utc::now()),
        };

        let content =
            serde_json::to_string_pretty(&session).context("Failed to serialize session data")?;

        std::fs::write(&self.session_path, content)
            .with_context(|| format!("Failed to write session file: {:?}", self.session_path))?;

        restrict_permissions(&self.session_path)?;

        info!("Session saved");
        debug!("Session saved to {:?}", self.session_path);
        Ok(())
    }

    /// Remove the session file. Returns whether one existed.
    pub fn remove(&self) -> Result<bool> {
        if !self.session_path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.session_path)
            .with_context(|| format!("Failed to remove session file: {:?}", self.session_path))?;
        info!("Session removed");
        Ok(true)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .with_context(|| format!("Failed to set permissions on {:?}", path))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

impl CredentialProvider for SessionStore {
    fn access_token(&self) -> Option<String> {
        self.token().map(|(token, _)| token)
    }
}

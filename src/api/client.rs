use anyhow::{Context, Result};
use reqwest::{Client, Method};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, error};
use url::Url;
use uuid::Uuid;

use super::http::{send_with_retry, RetryPolicy};
use super::types::GitHubApiError;

/// Default request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Public GitHub API endpoint
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default CLI version (from Cargo.toml)
const DEFAULT_VERSION: &str = env!("CARGO_PKG_VERSION");

const GITHUB_API_VERSION: &str = "2022-11-28";

/// Build the User-Agent string
fn build_user_agent() -> String {
    std::env::var("SIDEKICK_USER_AGENT")
        .unwrap_or_else(|_| format!("sidekick-cli/{}", DEFAULT_VERSION))
}

/// HTTP client for the GitHub REST API
pub struct ApiClient {
    client: Client,
    base_url: Url,
    user_agent: String,
    retry: RetryPolicy,
}

impl ApiClient {
    /// Create a new API client against `base_url` (GitHub or GitHub Enterprise).
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self> {
        // Url::join drops the last path segment unless it ends with a slash
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .with_context(|| format!("Invalid GitHub API URL: {}", base_url))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            user_agent: build_user_agent(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub(super) fn build_url(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("Failed to build URL for path: {}", path))
    }

    /// Send a request and return the raw response.
    async fn send<T>(
        &self,
        method: Method,
        path: &str,
        token: &str,
        body: Option<&T>,
    ) -> Result<reqwest::Response>
    where
        T: Serialize + ?Sized,
    {
        let url = self.build_url(path)?;
        let request_id = Uuid::new_v4().to_string();

        debug!("=== GitHub Request ===");
        debug!("{} {} (request {})", method, url, request_id);

        send_with_retry(self.retry, || {
            let mut request = self
                .client
                .request(method.clone(), url.clone())
                .header("Accept", "application/vnd.github+json")
                .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
                .header("User-Agent", &self.user_agent)
                .header("Authorization", format!("Bearer {}", token));

            if let Some(body) = body {
                request = request.json(body);
            }
            request
        })
        .await
        .with_context(|| format!("Failed to send request to {}", url))
    }

    /// Make an API call and decode the JSON response.
    ///
    /// Non-success statuses become a [`GitHubApiError`] inside the returned
    /// `anyhow::Error`, so callers can downcast to inspect the status.
    pub(super) async fn call_api<T, R>(
        &self,
        method: Method,
        path: &str,
        token: &str,
        body: Option<&T>,
    ) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.send(method, path, token, body).await?;
        let status = response.status();
        debug!("=== GitHub Response ===");
        debug!("Status: {}", status);

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let api_error = GitHubApiError::from_http_response(status.as_u16(), &error_text);

            if api_error.is_auth_failure() {
                error!("❌ {}", api_error.message);
                error!("   Check the token with 'sidekick status' or run 'sidekick login'.");
            } else {
                debug!("GitHub API request failed: {}", api_error);
            }

            return Err(api_error.into());
        }

        let response_text = response
            .text()
            .await
            .context("Failed to read response body")?;
        serde_json::from_str(&response_text).context("Failed to parse GitHub API response")
    }

    /// GET that maps 404 to `None`.
    pub(super) async fn get_optional<R>(&self, path: &str, token: &str) -> Result<Option<R>>
    where
        R: DeserializeOwned,
    {
        match self.call_api::<(), R>(Method::GET, path, token, None).await {
            Ok(value) => Ok(Some(value)),
            Err(e) => match e.downcast_ref::<GitHubApiError>() {
                Some(api) if api.is_not_found() || api.is_empty_repository() => Ok(None),
                _ => Err(e),
            },
        }
    }
}

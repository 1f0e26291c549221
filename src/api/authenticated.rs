//! Authenticated API client bound to one repository.
//!
//! This module provides `AuthenticatedClient`, a wrapper around `ApiClient`
//! that stores the target repository and access token for the lifetime of a
//! push, and exposes them through the `RemoteHost` seam.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::client::ApiClient;
use crate::domain::{GitHubRepo, RemoteCommit, TreeEntry};
use crate::vcs::{NewCommit, RemoteConnector, RemoteHost};

/// Authenticated API client with stored credentials.
///
/// Cloning is cheap; clones share the same `reqwest::Client` and therefore
/// its connection pool.
#[derive(Clone)]
pub struct AuthenticatedClient {
    inner: Arc<ApiClient>,
    repo: GitHubRepo,
    access_token: String,
}

impl AuthenticatedClient {
    pub fn new(client: Arc<ApiClient>, repo: GitHubRepo, access_token: String) -> Self {
        Self {
            inner: client,
            repo,
            access_token,
        }
    }

    pub fn repo(&self) -> &GitHubRepo {
        &self.repo
    }
}

/// Connects the push engine to GitHub through a shared `ApiClient`.
pub struct GitHubConnector {
    client: Arc<ApiClient>,
}

impl GitHubConnector {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl RemoteConnector for GitHubConnector {
    fn connect(&self, repo: &GitHubRepo, token: &str) -> Result<Box<dyn RemoteHost>> {
        Ok(Box::new(AuthenticatedClient::new(
            Arc::clone(&self.client),
            repo.clone(),
            token.to_string(),
        )))
    }
}

#[async_trait]
impl RemoteHost for AuthenticatedClient {
    async fn get_ref(&self, branch: &str) -> Result<Option<String>> {
        self.inner
            .get_branch_ref(&self.repo, &self.access_token, branch)
            .await
    }

    async fn get_commit(&self, sha: &str) -> Result<RemoteCommit> {
        self.inner
            .get_commit(&self.repo, &self.access_token, sha)
            .await
    }

    async fn get_tree(&self, sha: &str) -> Result<Vec<TreeEntry>> {
        self.inner.get_tree(&self.repo, &self.access_token, sha).await
    }

    async fn create_blob(&self, content: &[u8]) -> Result<String> {
        self.inner
            .create_blob(&self.repo, &self.access_token, content)
            .await
    }

    async fn create_tree(&self, entries: &[TreeEntry]) -> Result<String> {
        self.inner
            .create_tree(&self.repo, &self.access_token, entries)
            .await
    }

    async fn create_commit(&self, commit: &NewCommit<'_>) -> Result<String> {
        self.inner
            .create_commit(&self.repo, &self.access_token, commit)
            .await
    }

    async fn create_ref(&self, branch: &str, sha: &str) -> Result<()> {
        self.inner
            .create_branch_ref(&self.repo, &self.access_token, branch, sha)
            .await
    }

    async fn update_ref(&self, branch: &str, sha: &str, force: bool) -> Result<()> {
        self.inner
            .update_branch_ref(&self.repo, &self.access_token, branch, sha, force)
            .await
    }
}

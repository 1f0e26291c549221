//! Seams to the version-control collaborators.
//!
//! The push engine never touches git storage or the network directly. It is
//! handed a [`LocalRepo`] (commit log, refs, objects of the working
//! repository), a [`RemoteHost`] (the hosted repository's Git Data API) and a
//! [`CredentialProvider`]. Production code uses [`GitRepository`] and
//! `api::AuthenticatedClient`; tests use in-memory fakes.

mod git_repo;

pub use git_repo::GitRepository;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Commit, GitHubRepo, RemoteCommit, RemoteConfig, Signature, TreeEntry};

/// Read/write access to the local repository.
#[async_trait]
pub trait LocalRepo: Send + Sync {
    /// Name of the checked-out branch, `None` when HEAD is detached.
    async fn current_branch(&self) -> Result<Option<String>>;

    async fn list_remotes(&self) -> Result<Vec<RemoteConfig>>;

    /// Resolve a ref (full name or branch shorthand) to a commit oid.
    async fn resolve_ref(&self, name: &str) -> Result<Option<String>>;

    async fn write_ref(&self, name: &str, oid: &str) -> Result<()>;

    /// First-parent history of `reference`, newest first.
    async fn log(&self, reference: &str) -> Result<Vec<Commit>>;

    /// Entries of one tree level.
    async fn read_tree(&self, oid: &str) -> Result<Vec<TreeEntry>>;

    async fn read_blob(&self, oid: &str) -> Result<Vec<u8>>;
}

/// Commit object to be created on the remote.
#[derive(Debug, Clone)]
pub struct NewCommit<'a> {
    pub message: &'a str,
    pub tree: &'a str,
    pub parents: Vec<String>,
    pub author: &'a Signature,
    pub committer: &'a Signature,
}

/// Git Data API of the hosted repository.
#[async_trait]
pub trait RemoteHost: Send + Sync {
    /// Head sha of `refs/heads/<branch>`, `None` when the branch does not exist.
    async fn get_ref(&self, branch: &str) -> Result<Option<String>>;

    async fn get_commit(&self, sha: &str) -> Result<RemoteCommit>;

    /// Entries of one tree level.
    async fn get_tree(&self, sha: &str) -> Result<Vec<TreeEntry>>;

    async fn create_blob(&self, content: &[u8]) -> Result<String>;

    /// Create a tree from a complete entry list (no base tree).
    async fn create_tree(&self, entries: &[TreeEntry]) -> Result<String>;

    async fn create_commit(&self, commit: &NewCommit<'_>) -> Result<String>;

    async fn create_ref(&self, branch: &str, sha: &str) -> Result<()>;

    /// Move `refs/heads/<branch>`. Without `force` the host must reject
    /// anything that is not a fast-forward with [`RefRejected`].
    async fn update_ref(&self, branch: &str, sha: &str, force: bool) -> Result<()>;
}

/// Ref update refused by the remote host.
#[derive(Debug, Error)]
#[error("remote rejected update of {branch}: {message}")]
pub struct RefRejected {
    pub branch: String,
    pub message: String,
}

/// Opens a [`RemoteHost`] for a repository once credentials are known.
pub trait RemoteConnector: Send + Sync {
    fn connect(&self, repo: &GitHubRepo, token: &str) -> Result<Box<dyn RemoteHost>>;
}

/// Source of the access token used against the remote host.
pub trait CredentialProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// Fixed token, mostly useful for tests and `--token`.
pub struct StaticToken(pub String);

impl CredentialProvider for StaticToken {
    fn access_token(&self) -> Option<String> {
        if self.0.trim().is_empty() {
            None
        } else {
            Some(self.0.clone())
        }
    }
}

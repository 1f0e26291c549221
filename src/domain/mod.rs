//! Domain types shared across modules.
//!
//! This module contains the version-control data model used by the local
//! repository adapter, the GitHub client and the push engine. Git objects are
//! modelled as distinct record types and validated at the adapter boundary,
//! so the engines never deal with loosely typed JSON.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Author or committer identity with its timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    /// Timestamp including the original timezone offset
    pub when: DateTime<FixedOffset>,
}

/// A commit in the local repository. Immutable once read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub oid: String,
    /// Object id of the root tree snapshot
    pub tree: String,
    /// Ordered parent oids (first parent first)
    pub parents: Vec<String>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

impl Commit {
    pub fn short_oid(&self) -> &str {
        short_sha(&self.oid)
    }
}

/// Kind of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Blob,
    Tree,
    /// Gitlink to a submodule commit
    Commit,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Blob => "blob",
            EntryKind::Tree => "tree",
            EntryKind::Commit => "commit",
        }
    }
}

/// A single entry of a tree object (one directory level).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub name: String,
    /// Octal file mode as git writes it ("100644", "100755", "040000", "120000", "160000")
    pub mode: String,
    pub kind: EntryKind,
    pub oid: String,
}

/// Commit as known by the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommit {
    pub sha: String,
    pub tree: String,
    pub parents: Vec<String>,
}

/// A configured remote of the local repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub name: String,
    pub url: String,
}

/// Owner/repository pair of a GitHub-hosted repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubRepo {
    pub owner: String,
    pub repo: String,
}

impl GitHubRepo {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Options for a single push invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOptions {
    pub remote: String,
    /// Branch to push; defaults to the checked-out branch
    pub branch: Option<String>,
    pub force: bool,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            branch: None,
            force: false,
        }
    }
}

/// Abbreviate an object id the way `git push` prints it.
pub fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

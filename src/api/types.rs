//! Request and response bodies of the GitHub Git Data API.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{EntryKind, RemoteCommit, Signature, TreeEntry};

/// `GET /repos/{owner}/{repo}/git/ref/heads/{branch}`
#[derive(Debug, Deserialize)]
pub(super) struct RefResponse {
    pub object: ObjectRef,
}

#[derive(Debug, Deserialize)]
pub(super) struct ObjectRef {
    pub sha: String,
}

/// `GET /repos/{owner}/{repo}/git/commits/{sha}`
#[derive(Debug, Deserialize)]
pub(super) struct CommitResponse {
    pub sha: String,
    pub tree: ObjectRef,
    #[serde(default)]
    pub parents: Vec<ObjectRef>,
}

impl From<CommitResponse> for RemoteCommit {
    fn from(c: CommitResponse) -> Self {
        Self {
            sha: c.sha,
            tree: c.tree.sha,
            parents: c.parents.into_iter().map(|p| p.sha).collect(),
        }
    }
}

/// `GET /repos/{owner}/{repo}/git/trees/{sha}`
#[derive(Debug, Deserialize)]
pub(super) struct TreeResponse {
    pub tree: Vec<TreeItem>,
    #[serde(default)]
    pub truncated: bool,
}

/// Tree item as sent and received by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(super) struct TreeItem {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub sha: String,
}

impl From<TreeItem> for TreeEntry {
    fn from(item: TreeItem) -> Self {
        Self {
            name: item.path,
            mode: item.mode,
            kind: item.kind,
            oid: item.sha,
        }
    }
}

impl From<&TreeEntry> for TreeItem {
    fn from(entry: &TreeEntry) -> Self {
        Self {
            path: entry.name.clone(),
            mode: entry.mode.clone(),
            kind: entry.kind,
            sha: entry.oid.clone(),
        }
    }
}

/// `POST /repos/{owner}/{repo}/git/blobs`
#[derive(Debug, Serialize)]
pub(super) struct CreateBlobRequest {
    pub content: String,
    pub encoding: &'static str,
}

/// `POST /repos/{owner}/{repo}/git/trees`
#[derive(Debug, Serialize)]
pub(super) struct CreateTreeRequest {
    pub tree: Vec<TreeItem>,
}

/// `POST /repos/{owner}/{repo}/git/commits`
#[derive(Debug, Serialize)]
pub(super) struct CreateCommitRequest<'a> {
    pub message: &'a str,
    pub tree: &'a str,
    pub parents: &'a [String],
    pub author: ApiSignature,
    pub committer: ApiSignature,
}

#[derive(Debug, Serialize)]
pub(super) struct ApiSignature {
    pub name: String,
    pub email: String,
    /// ISO 8601 with the original offset
    pub date: String,
}

impl From<&Signature> for ApiSignature {
    fn from(sig: &Signature) -> Self {
        Self {
            name: sig.name.clone(),
            email: sig.email.clone(),
            date: sig.when.to_rfc3339(),
        }
    }
}

/// `POST /repos/{owner}/{repo}/git/refs`
#[derive(Debug, Serialize)]
pub(super) struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub sha: &'a str,
}

/// `PATCH /repos/{owner}/{repo}/git/refs/heads/{branch}`
#[derive(Debug, Serialize)]
pub(super) struct UpdateRefRequest<'a> {
    pub sha: &'a str,
    pub force: bool,
}

/// Any response carrying just the sha of a created object.
#[derive(Debug, Deserialize)]
pub(super) struct ShaResponse {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Non-success response from the GitHub API.
#[derive(Debug, Clone, Error)]
#[error("GitHub API error {status}: {message}")]
pub struct GitHubApiError {
    pub status: u16,
    pub message: String,
}

impl GitHubApiError {
    /// Build from a status code and the raw body, extracting GitHub's
    /// `{"message": ...}` when present.
    pub fn from_http_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .map(|b| b.message)
            .unwrap_or_else(|_| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    "Unknown error".to_string()
                } else {
                    trimmed.to_string()
                }
            });
        Self { status, message }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// 409 "Git Repository is empty." is how the API reports a repository
    /// without any commit.
    pub fn is_empty_repository(&self) -> bool {
        self.status == 409
    }

    pub fn is_auth_failure(&self) -> bool {
        self.status == 401 || self.status == 403
    }

    /// Ref update refused because it is not a fast-forward.
    pub fn is_non_fast_forward(&self) -> bool {
        self.status == 422 && self.message.to_lowercase().contains("fast forward")
    }
}

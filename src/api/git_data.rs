//! Git Data API endpoints: refs, commits, trees and blobs.

use anyhow::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Method;
use tracing::{debug, warn};

use super::client::ApiClient;
use super::types::{
    CommitResponse, CreateBlobRequest, CreateCommitRequest, CreateRefRequest, CreateTreeRequest,
    GitHubApiError, RefResponse, ShaResponse, TreeItem, TreeResponse, UpdateRefRequest,
};
use crate::domain::{GitHubRepo, RemoteCommit, TreeEntry};
use crate::vcs::{NewCommit, RefRejected};

fn repo_path(repo: &GitHubRepo, rest: &str) -> String {
    format!("repos/{}/{}/git/{}", repo.owner, repo.repo, rest)
}

impl ApiClient {
    pub async fn get_branch_ref(
        &self,
        repo: &GitHubRepo,
        token: &str,
        branch: &str,
    ) -> Result<Option<String>> {
        let path = repo_path(repo, &format!("ref/heads/{}", branch));
        let response: Option<RefResponse> = self.get_optional(&path, token).await?;
        Ok(response.map(|r| r.object.sha))
    }

    pub async fn get_commit(
        &self,
        repo: &GitHubRepo,
        token: &str,
        sha: &str,
    ) -> Result<RemoteCommit> {
        let path = repo_path(repo, &format!("commits/{}", sha));
        let response: CommitResponse = self
            .call_api::<(), _>(Method::GET, &path, token, None)
            .await?;
        Ok(response.into())
    }

    pub async fn get_tree(
        &self,
        repo: &GitHubRepo,
        token: &str,
        sha: &str,
    ) -> Result<Vec<TreeEntry>> {
        let path = repo_path(repo, &format!("trees/{}", sha));
        let response: TreeResponse = self
            .call_api::<(), _>(Method::GET, &path, token, None)
            .await?;
        if response.truncated {
            // GitHub caps a listing at 100,000 entries
            warn!("Tree listing for {} was truncated", sha);
        }
        Ok(response.tree.into_iter().map(TreeEntry::from).collect())
    }

    pub async fn create_blob(
        &self,
        repo: &GitHubRepo,
        token: &str,
        content: &[u8],
    ) -> Result<String> {
        let body = CreateBlobRequest {
            content: STANDARD.encode(content),
            encoding: "base64",
        };
        let response: ShaResponse = self
            .call_api(Method::POST, &repo_path(repo, "blobs"), token, Some(&body))
            .await?;
        debug!("Created blob {} ({} bytes)", response.sha, content.len());
        Ok(response.sha)
    }

    pub async fn create_tree(
        &self,
        repo: &GitHubRepo,
        token: &str,
        entries: &[TreeEntry],
    ) -> Result<String> {
        let body = CreateTreeRequest {
            tree: entries.iter().map(TreeItem::from).collect(),
        };
        let response: ShaResponse = self
            .call_api(Method::POST, &repo_path(repo, "trees"), token, Some(&body))
            .await?;
        Ok(response.sha)
    }

    pub async fn create_commit(
        &self,
        repo: &GitHubRepo,
        token: &str,
        commit: &NewCommit<'_>,
    ) -> Result<String> {
        let body = CreateCommitRequest {
            message: commit.message,
            tree: commit.tree,
            parents: &commit.parents,
            author: commit.author.into(),
            committer: commit.committer.into(),
        };
        let response: ShaResponse = self
            .call_api(Method::POST, &repo_path(repo, "commits"), token, Some(&body))
            .await?;
        Ok(response.sha)
    }

    pub async fn create_branch_ref(
        &self,
        repo: &GitHubRepo,
        token: &str,
        branch: &str,
        sha: &str,
    ) -> Result<()> {
        let body = CreateRefRequest {
            ref_name: format!("refs/heads/{}", branch),
            sha,
        };
        let _: serde_json::Value = self
            .call_api(Method::POST, &repo_path(repo, "refs"), token, Some(&body))
            .await?;
        Ok(())
    }

    pub async fn update_branch_ref(
        &self,
        repo: &GitHubRepo,
        token: &str,
        branch: &str,
        sha: &str,
        force: bool,
    ) -> Result<()> {
        let path = repo_path(repo, &format!("refs/heads/{}", branch));
        let body = UpdateRefRequest { sha, force };
        let result: Result<serde_json::Value> =
            self.call_api(Method::PATCH, &path, token, Some(&body)).await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => match e.downcast_ref::<GitHubApiError>() {
                Some(api) if api.is_non_fast_forward() => Err(RefRejected {
                    branch: branch.to_string(),
                    message: api.message.clone(),
                }
                .into()),
                _ => Err(e),
            },
        }
    }
}

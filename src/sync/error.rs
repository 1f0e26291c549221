//! Error types for the push engine

use thiserror::Error;

use crate::vcs::RefRejected;

/// Error returned by [`push`](super::push). Always displayed as
/// `Push failed: <cause>`; the cause stays reachable through `source()`.
#[derive(Debug, Error)]
#[error("Push failed: {0}")]
pub struct PushError(#[from] pub PushFailure);

impl PushError {
    pub fn failure(&self) -> &PushFailure {
        &self.0
    }

    /// True when the remote refused the update because histories diverged.
    /// Callers use this to offer a retry with `force`.
    pub fn is_rejected(&self) -> bool {
        matches!(
            self.0,
            PushFailure::Rejected { .. } | PushFailure::RemoteRejected(_)
        )
    }
}

impl From<anyhow::Error> for PushError {
    fn from(err: anyhow::Error) -> Self {
        PushError(PushFailure::Other(err))
    }
}

#[derive(Debug, Error)]
pub enum PushFailure {
    #[error("No GitHub token available. Run 'sidekick login' or set GITHUB_TOKEN.")]
    NoCredentials,

    #[error("No branch specified and HEAD is not on a branch")]
    NoBranch,

    #[error("src refspec {0} does not match any local branch")]
    UnknownBranch(String),

    #[error("Remote '{0}' not found")]
    RemoteNotFound(String),

    #[error("Unsupported remote URL '{0}': only GitHub repositories can be pushed to")]
    UnsupportedRemote(String),

    #[error(
        "Remote repository {repo} is empty. Pushing the first commit of an empty repository is not supported.\n\
         To fix this, do one of the following:\n  \
         1. Initialize the repository on GitHub with a README, then push again\n  \
         2. Push the first commit with the git command line: git push -u {remote} {branch}\n  \
         3. Push to a repository that already has a default branch (main or master)"
    )]
    EmptyRepository {
        repo: String,
        remote: String,
        branch: String,
    },

    #[error(
        "! [rejected] {branch} -> {branch} (non-fast-forward)\n\
         Updates were rejected because the remote contains work that you do not have locally. \
         Integrate the remote changes (e.g. pull) before pushing again, or push with --force to overwrite them."
    )]
    Rejected { branch: String },

    #[error("Updates were rejected by the remote: {0}")]
    RemoteRejected(#[source] RefRejected),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

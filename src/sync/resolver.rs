//! Remote synchronization resolver.
//!
//! Decides which local commits must be recreated on the remote for a branch:
//! - remote branch missing: the whole local history
//! - remote head found in local history (by oid, else by tree content): the
//!   commits after it
//! - otherwise the histories diverged; rejected unless forced, in which case
//!   the remote first-parent chain is searched for a commit whose content
//!   matches a local commit, and only the commits after that are recreated.
//!
//! Tree equality stands in for commit equality because a tree id is a pure
//! function of the snapshot: a rebase or amend that reproduces the same
//! content yields the same tree under a different commit id.

use std::collections::HashMap;

use anyhow::Context;
use tracing::{debug, info, warn};

use super::error::PushFailure;
use crate::domain::{short_sha, Commit};
use crate::vcs::{LocalRepo, RemoteHost};

/// Default bound on remote commits fetched during the ancestor search.
pub const DEFAULT_MAX_ANCESTOR_DEPTH: usize = 100;

/// How the commits to push relate to the remote branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncKind {
    /// The branch does not exist on the remote.
    NewBranch,
    /// The remote head is contained in local history.
    FastForward,
    /// Forced: rebuilt on top of a remote commit with shared content.
    CommonAncestor,
    /// Forced: no shared content, history uploaded without a parent.
    Orphan,
}

/// Remote commit the first recreated commit is parented on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBase {
    pub sha: String,
    /// Tree of `sha`; the diff base for the first uploaded tree.
    pub tree: String,
}

/// Outcome of the resolver.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    /// Commits to recreate remotely, oldest first.
    pub commits: Vec<Commit>,
    pub base: Option<RemoteBase>,
    pub kind: SyncKind,
    /// The sync point was found by tree content rather than commit id.
    pub matched_by_tree: bool,
    /// The ancestor search hit its bound without finding shared content.
    pub search_truncated: bool,
}

impl SyncPlan {
    fn full_history(log: &[Commit], kind: SyncKind) -> Self {
        Self {
            commits: log.iter().rev().cloned().collect(),
            base: None,
            kind,
            matched_by_tree: false,
            search_truncated: false,
        }
    }

    /// Local history up to (excluding) `index`, rebased on `base`.
    fn after(log: &[Commit], index: usize, base: RemoteBase, kind: SyncKind) -> Self {
        Self {
            commits: log[..index].iter().rev().cloned().collect(),
            base: Some(base),
            kind,
            matched_by_tree: false,
            search_truncated: false,
        }
    }
}

/// Common-content point between local history and the remote chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommonAncestor {
    pub remote_sha: String,
    /// Index into the newest-first local log
    pub local_index: usize,
}

/// Result of [`find_common_ancestor`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AncestorSearch {
    pub found: Option<CommonAncestor>,
    pub truncated: bool,
}

/// Local ref backing a branch name.
pub fn local_branch_ref(branch: &str) -> String {
    format!("refs/heads/{}", branch)
}

/// Compute the commits to push for `branch`.
///
/// `remote_head` is the remote branch head, `None` when the branch does not
/// exist remotely. Fails with [`PushFailure::Rejected`] when histories
/// diverged and `force` is not set.
pub async fn find_commits_to_push(
    local: &dyn LocalRepo,
    remote: &dyn RemoteHost,
    branch: &str,
    remote_head: Option<&str>,
    force: bool,
    max_ancestor_depth: usize,
) -> Result<SyncPlan, PushFailure> {
    let log = local
        .log(&local_branch_ref(branch))
        .await
        .with_context(|| format!("Failed to read history of {}", branch))?;

    let remote_head = match remote_head {
        Some(sha) => sha,
        None => {
            debug!("Remote branch {} missing, pushing {} commits", branch, log.len());
            return Ok(SyncPlan::full_history(&log, SyncKind::NewBranch));
        }
    };

    if let Some(index) = log.iter().position(|c| c.oid == remote_head) {
        debug!("Remote head {} is local commit #{}", short_sha(remote_head), index);
        let base = RemoteBase {
            sha: remote_head.to_string(),
            tree: log[index].tree.clone(),
        };
        return Ok(SyncPlan::after(&log, index, base, SyncKind::FastForward));
    }

    let remote_commit = remote
        .get_commit(remote_head)
        .await
        .with_context(|| format!("Failed to fetch remote head {}", remote_head))?;

    if let Some(index) = log.iter().position(|c| c.tree == remote_commit.tree) {
        info!(
            "Remote head {} matches local {} by content",
            short_sha(remote_head),
            log[index].short_oid()
        );
        let base = RemoteBase {
            sha: remote_head.to_string(),
            tree: remote_commit.tree,
        };
        let mut plan = SyncPlan::after(&log, index, base, SyncKind::FastForward);
        plan.matched_by_tree = true;
        return Ok(plan);
    }

    if !force {
        return Err(PushFailure::Rejected {
            branch: branch.to_string(),
        });
    }

    info!("Histories diverged, searching remote history for shared content");
    let search = find_common_ancestor(&log, remote, remote_head, max_ancestor_depth).await;

    let mut plan = match search.found {
        Some(ancestor) => {
            let local_commit = &log[ancestor.local_index];
            info!(
                "Common content: remote {} = local {}",
                short_sha(&ancestor.remote_sha),
                local_commit.short_oid()
            );
            let base = RemoteBase {
                sha: ancestor.remote_sha,
                tree: local_commit.tree.clone(),
            };
            SyncPlan::after(&log, ancestor.local_index, base, SyncKind::CommonAncestor)
        }
        None => {
            if search.truncated {
                warn!(
                    "No shared content within {} remote commits; pushing full history without a parent",
                    max_ancestor_depth
                );
            } else {
                info!("No shared content with remote history; pushing full history without a parent");
            }
            SyncPlan::full_history(&log, SyncKind::Orphan)
        }
    };
    plan.search_truncated = search.truncated && plan.kind == SyncKind::Orphan;
    Ok(plan)
}

/// Walk the remote first-parent chain from `remote_head` (at most
/// `max_depth` commits) and return the newest local commit whose tree equals
/// one of the remote trees.
///
/// A failed remote fetch ends the search with no ancestor.
pub async fn find_common_ancestor(
    local_log: &[Commit],
    remote: &dyn RemoteHost,
    remote_head: &str,
    max_depth: usize,
) -> AncestorSearch {
    // tree sha -> newest remote commit with that tree
    let mut remote_trees: HashMap<String, String> = HashMap::new();
    let mut next = Some(remote_head.to_string());
    let mut walked = 0;

    while let Some(sha) = next.take() {
        if walked >= max_depth {
            next = Some(sha);
            break;
        }
        match remote.get_commit(&sha).await {
            Ok(commit) => {
                walked += 1;
                remote_trees.entry(commit.tree).or_insert(commit.sha);
                next = commit.parents.into_iter().next();
            }
            Err(e) => {
                warn!("Failed to fetch remote commit {} during ancestor search: {:#}", sha, e);
                return AncestorSearch::default();
            }
        }
    }

    let truncated = next.is_some();
    debug!(
        "Ancestor search walked {} remote commits (truncated: {})",
        walked, truncated
    );

    let found = local_log
        .iter()
        .enumerate()
        .find_map(|(index, commit)| {
            remote_trees.get(&commit.tree).map(|remote_sha| CommonAncestor {
                remote_sha: remote_sha.clone(),
                local_index: index,
            })
        });

    AncestorSearch { found, truncated }
}

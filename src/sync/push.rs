//! Push orchestrator.
//!
//! Drives one push end to end:
//! branch and remote resolution, remote head lookup, commit selection (see
//! [`resolver`](super::resolver)), sequential commit recreation, the single
//! ref update, and best-effort update of the local tracking ref.
//!
//! The remote ref is the only thing a push makes visible. It moves exactly
//! once, after every new commit object exists remotely.

use anyhow::Context;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::error::{PushError, PushFailure};
use super::progress::{Progress, ProgressSink};
use super::remote_url::parse_github_url;
use super::resolver::{
    find_commits_to_push, local_branch_ref, SyncKind, SyncPlan, DEFAULT_MAX_ANCESTOR_DEPTH,
};
use super::tree_builder::TreeBuilder;
use crate::domain::{short_sha, GitHubRepo, PushOptions};
use crate::vcs::{CredentialProvider, LocalRepo, NewCommit, RefRejected, RemoteConnector, RemoteHost};

/// Branches probed, in order, to tell an empty repository from a missing branch.
const DEFAULT_BRANCHES: [&str; 2] = ["main", "master"];

pub const UP_TO_DATE: &str = "Everything up-to-date";

/// Collaborators of a push. Everything the orchestrator touches is passed in.
pub struct PushContext<'a> {
    pub local: &'a dyn LocalRepo,
    pub credentials: &'a dyn CredentialProvider,
    pub connector: &'a dyn RemoteConnector,
    pub progress: Option<&'a dyn ProgressSink>,
    pub max_ancestor_depth: usize,
}

impl<'a> PushContext<'a> {
    pub fn new(
        local: &'a dyn LocalRepo,
        credentials: &'a dyn CredentialProvider,
        connector: &'a dyn RemoteConnector,
    ) -> Self {
        Self {
            local,
            credentials,
            connector,
            progress: None,
            max_ancestor_depth: DEFAULT_MAX_ANCESTOR_DEPTH,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressSink) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_max_ancestor_depth(mut self, depth: usize) -> Self {
        self.max_ancestor_depth = depth;
        self
    }
}

/// Push a local branch to its GitHub remote.
///
/// Returns a summary in the style of `git push` output. Every error is a
/// [`PushError`] displayed as `Push failed: <cause>`. The progress sink, if
/// any, is finished on both paths.
pub async fn push(ctx: &PushContext<'_>, options: &PushOptions) -> Result<String, PushError> {
    let span = info_span!("push", id = %Uuid::new_v4());
    let progress = Progress::new(ctx.progress);
    run(ctx, options, &progress)
        .instrument(span)
        .await
        .map_err(PushError::from)
}

async fn run(
    ctx: &PushContext<'_>,
    options: &PushOptions,
    progress: &Progress<'_>,
) -> Result<String, PushFailure> {
    let token = ctx
        .credentials
        .access_token()
        .ok_or(PushFailure::NoCredentials)?;

    let branch = match options.branch.as_deref().map(str::trim) {
        Some(branch) if !branch.is_empty() => branch.to_string(),
        _ => ctx
            .local
            .current_branch()
            .await
            .context("Failed to read current branch")?
            .ok_or(PushFailure::NoBranch)?,
    };

    let remote_config = ctx
        .local
        .list_remotes()
        .await
        .context("Failed to read remote configuration")?
        .into_iter()
        .find(|r| r.name == options.remote)
        .ok_or_else(|| PushFailure::RemoteNotFound(options.remote.clone()))?;
    let repo = parse_github_url(&remote_config.url)
        .ok_or_else(|| PushFailure::UnsupportedRemote(remote_config.url.clone()))?;

    let local_head = ctx
        .local
        .resolve_ref(&local_branch_ref(&branch))
        .await
        .with_context(|| format!("Failed to resolve branch {}", branch))?
        .ok_or_else(|| PushFailure::UnknownBranch(branch.clone()))?;

    info!(
        "Pushing {} ({}) to {}",
        branch,
        short_sha(&local_head),
        repo.full_name()
    );

    let remote_box = ctx.connector.connect(&repo, &token)?;
    let remote = remote_box.as_ref();

    let remote_head = remote
        .get_ref(&branch)
        .await
        .with_context(|| format!("Failed to read remote branch {}", branch))?;

    let plan = match remote_head.as_deref() {
        Some(head) => {
            find_commits_to_push(
                ctx.local,
                remote,
                &branch,
                Some(head),
                options.force,
                ctx.max_ancestor_depth,
            )
            .await?
        }
        None => plan_new_branch(ctx, remote, &repo, &options.remote, &branch).await?,
    };

    if plan.search_truncated {
        progress.report(format!(
            "warning: no shared history within {} remote commits, uploading full history",
            ctx.max_ancestor_depth
        ));
    }

    let new_head = if plan.commits.is_empty() {
        match (&plan.base, remote_head.as_deref()) {
            // Remote already holds the branch content
            (Some(base), Some(head)) if base.sha == head => {
                info!("Remote {} already at {}", branch, short_sha(head));
                return Ok(UP_TO_DATE.to_string());
            }
            (Some(base), _) => base.sha.clone(),
            (None, _) => {
                info!("Nothing to push for {}", branch);
                return Ok(UP_TO_DATE.to_string());
            }
        }
    } else {
        create_commits(ctx, remote, &plan, progress).await?
    };

    progress.report(format!("Updating {} -> {}", branch, short_sha(&new_head)));
    let update = match remote_head.as_deref() {
        None => remote.create_ref(&branch, &new_head).await,
        Some(_) => remote.update_ref(&branch, &new_head, options.force).await,
    };
    update.map_err(|e| match e.downcast::<RefRejected>() {
        Ok(rejected) => PushFailure::RemoteRejected(rejected),
        Err(e) => PushFailure::Other(e.context(format!("Failed to update remote branch {}", branch))),
    })?;

    let tracking_ref = format!("refs/remotes/{}/{}", options.remote, branch);
    if let Err(e) = ctx.local.write_ref(&tracking_ref, &local_head).await {
        warn!("Failed to update {}: {:#}", tracking_ref, e);
    }

    Ok(format!(
        "To {}\n{}",
        remote_config.url,
        ref_update_line(&branch, remote_head.as_deref(), &new_head, plan.kind)
    ))
}

/// Plan for a branch that does not exist remotely.
///
/// The repository must have a default branch. When the local branch
/// descends from it, only the commits after the default head are uploaded.
async fn plan_new_branch(
    ctx: &PushContext<'_>,
    remote: &dyn RemoteHost,
    repo: &GitHubRepo,
    remote_name: &str,
    branch: &str,
) -> Result<SyncPlan, PushFailure> {
    let mut default_head = None;
    for name in DEFAULT_BRANCHES {
        let head = remote
            .get_ref(name)
            .await
            .with_context(|| format!("Failed to read remote branch {}", name))?;
        if let Some(sha) = head {
            debug!("Default branch {} at {}", name, short_sha(&sha));
            default_head = Some(sha);
            break;
        }
    }

    let default_head = match default_head {
        Some(sha) => sha,
        None => {
            return Err(PushFailure::EmptyRepository {
                repo: repo.full_name(),
                remote: remote_name.to_string(),
                branch: branch.to_string(),
            })
        }
    };

    match find_commits_to_push(
        ctx.local,
        remote,
        branch,
        Some(&default_head),
        false,
        ctx.max_ancestor_depth,
    )
    .await
    {
        Ok(mut plan) => {
            plan.kind = SyncKind::NewBranch;
            Ok(plan)
        }
        Err(PushFailure::Rejected { .. }) => {
            debug!("{} does not descend from the default branch", branch);
            find_commits_to_push(ctx.local, remote, branch, None, false, ctx.max_ancestor_depth)
                .await
        }
        Err(e) => Err(e),
    }
}

/// Recreate the plan's commits remotely, oldest first. Returns the new head.
async fn create_commits(
    ctx: &PushContext<'_>,
    remote: &dyn RemoteHost,
    plan: &SyncPlan,
    progress: &Progress<'_>,
) -> Result<String, PushFailure> {
    let total = plan.commits.len();
    progress.report(format!("Enumerating commits: {}, done.", total));

    let mut builder = TreeBuilder::new(ctx.local, remote);
    let mut parent = plan.base.as_ref().map(|b| b.sha.clone());
    let mut remote_tree = plan.base.as_ref().map(|b| b.tree.clone());

    for (index, commit) in plan.commits.iter().enumerate() {
        let tree = builder
            .build_commit_tree(commit, remote_tree.as_deref())
            .await?;
        let new_commit = NewCommit {
            message: &commit.message,
            tree: &tree,
            parents: parent.iter().cloned().collect(),
            author: &commit.author,
            committer: &commit.committer,
        };
        let sha = remote
            .create_commit(&new_commit)
            .await
            .with_context(|| format!("Failed to create commit for {}", commit.short_oid()))?;
        debug!("Created {} for local {}", short_sha(&sha), commit.short_oid());

        parent = Some(sha);
        remote_tree = Some(tree);
        progress.report_ratio("Writing commits", index + 1, total);
    }

    let stats = builder.stats();
    info!(
        "📊 Pushed {} commits: {} blobs uploaded, {} reused, {} trees created, {} reused",
        total, stats.blobs_uploaded, stats.blobs_reused, stats.trees_created, stats.trees_reused
    );

    parent.ok_or_else(|| PushFailure::Other(anyhow::anyhow!("No commits were created")))
}

/// One `git push`-style ref line.
fn ref_update_line(branch: &str, old: Option<&str>, new: &str, kind: SyncKind) -> String {
    match old {
        None => format!(" * [new branch]      {} -> {}", branch, branch),
        Some(old) if matches!(kind, SyncKind::CommonAncestor | SyncKind::Orphan) => format!(
            " + {}...{} {} -> {} (forced update)",
            short_sha(old),
            short_sha(new),
            branch,
            branch
        ),
        Some(old) => format!(
            "   {}..{}  {} -> {}",
            short_sha(old),
            short_sha(new),
            branch,
            branch
        ),
    }
}

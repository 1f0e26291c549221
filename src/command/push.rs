use anyhow::Result;
use std::path::Path;
use tracing::debug;

use crate::api::{ApiClient, GitHubConnector};
use crate::cli;
use crate::config::Config;
use crate::domain::PushOptions;
use crate::session::SessionStore;
use crate::sync::{self, PushContext, StderrProgress};
use crate::vcs::GitRepository;

pub async fn run_push(
    config: &Config,
    store: &SessionStore,
    options: PushOptions,
    repo: Option<String>,
) -> Result<()> {
    let root = cli::resolve_repo_root(repo)?;
    if !root.join(".git").exists() && !is_bare(&root) {
        anyhow::bail!("Not a git repository: {}", root.display());
    }
    debug!("Pushing from {}", root.display());

    let local = GitRepository::new(root.clone());
    let connector = GitHubConnector::new(ApiClient::new(
        &config.github_api_url,
        config.request_timeout_secs,
    )?);
    let progress = StderrProgress;

    let ctx = PushContext::new(&local, store, &connector)
        .with_progress(&progress)
        .with_max_ancestor_depth(config.max_ancestor_depth);

    let summary = sync::push(&ctx, &options).await?;
    println!("{}", summary);

    Ok(())
}

fn is_bare(path: &Path) -> bool {
    path.join("HEAD").is_file() && path.join("objects").is_dir()
}

//! `LocalRepo` backed by an on-disk repository through libgit2.
//!
//! libgit2 calls are blocking, so every operation opens the repository on a
//! blocking worker thread. The repository handle is never shared between
//! calls.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use git2::{ErrorCode, ObjectType, Oid, Repository, Sort};
use tracing::debug;

use super::LocalRepo;
use crate::domain::{Commit, EntryKind, RemoteConfig, Signature, TreeEntry};

/// Local repository rooted at a working-tree directory.
#[derive(Debug, Clone)]
pub struct GitRepository {
    path: PathBuf,
}

impl GitRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn with_repo<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Repository) -> Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let repo = Repository::open(&path)
                .with_context(|| format!("Failed to open repository at {}", path.display()))?;
            f(&repo)
        })
        .await
        .context("Repository worker thread failed")?
    }
}

fn convert_signature(sig: &git2::Signature<'_>) -> Result<Signature> {
    let when = sig.when();
    let offset = FixedOffset::east_opt(when.offset_minutes() * 60)
        .ok_or_else(|| anyhow!("Invalid timezone offset: {} minutes", when.offset_minutes()))?;
    let utc = DateTime::from_timestamp(when.seconds(), 0)
        .ok_or_else(|| anyhow!("Invalid commit timestamp: {}", when.seconds()))?;

    Ok(Signature {
        name: String::from_utf8_lossy(sig.name_bytes()).into_owned(),
        email: String::from_utf8_lossy(sig.email_bytes()).into_owned(),
        when: utc.with_timezone(&offset),
    })
}

fn convert_commit(commit: &git2::Commit<'_>) -> Result<Commit> {
    Ok(Commit {
        oid: commit.id().to_string(),
        tree: commit.tree_id().to_string(),
        parents: commit.parent_ids().map(|id| id.to_string()).collect(),
        author: convert_signature(&commit.author())?,
        committer: convert_signature(&commit.committer())?,
        message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
    })
}

fn resolve(repo: &Repository, name: &str) -> Result<Option<Oid>> {
    let reference = match repo.resolve_reference_from_short_name(name) {
        Ok(r) => r,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("Failed to resolve ref {}", name)),
    };
    let commit = reference
        .peel_to_commit()
        .with_context(|| format!("Ref {} does not point to a commit", name))?;
    Ok(Some(commit.id()))
}

#[async_trait]
impl LocalRepo for GitRepository {
    async fn current_branch(&self) -> Result<Option<String>> {
        self.with_repo(|repo| match repo.head() {
            Ok(head) if head.is_branch() => Ok(head.shorthand().map(str::to_string)),
            Ok(_) => Ok(None),
            Err(e) if e.code() == ErrorCode::UnbornBranch => {
                let head = repo.find_reference("HEAD")?;
                Ok(head
                    .symbolic_target()
                    .and_then(|t| t.strip_prefix("refs/heads/"))
                    .map(str::to_string))
            }
            Err(e) => Err(e).context("Failed to read HEAD"),
        })
        .await
    }

    async fn list_remotes(&self) -> Result<Vec<RemoteConfig>> {
        self.with_repo(|repo| {
            let mut remotes = Vec::new();
            for name in repo.remotes()?.iter().flatten() {
                let remote = repo.find_remote(name)?;
                if let Some(url) = remote.url() {
                    remotes.push(RemoteConfig {
                        name: name.to_string(),
                        url: url.to_string(),
                    });
                }
            }
            Ok(remotes)
        })
        .await
    }

    async fn resolve_ref(&self, name: &str) -> Result<Option<String>> {
        let name = name.to_string();
        self.with_repo(move |repo| Ok(resolve(repo, &name)?.map(|oid| oid.to_string())))
            .await
    }

    async fn write_ref(&self, name: &str, oid: &str) -> Result<()> {
        let name = name.to_string();
        let oid = oid.to_string();
        self.with_repo(move |repo| {
            let oid = Oid::from_str(&oid).with_context(|| format!("Invalid oid: {}", oid))?;
            repo.reference(&name, oid, true, "sidekick: update tracking ref")
                .with_context(|| format!("Failed to write ref {}", name))?;
            debug!("Wrote {} -> {}", name, oid);
            Ok(())
        })
        .await
    }

    async fn log(&self, reference: &str) -> Result<Vec<Commit>> {
        let reference = reference.to_string();
        self.with_repo(move |repo| {
            let head = resolve(repo, &reference)?
                .ok_or_else(|| anyhow!("Unknown ref: {}", reference))?;

            let mut walk = repo.revwalk()?;
            walk.set_sorting(Sort::TOPOLOGICAL)?;
            walk.simplify_first_parent()?;
            walk.push(head)?;

            let mut commits = Vec::new();
            for oid in walk {
                let commit = repo.find_commit(oid?)?;
                commits.push(convert_commit(&commit)?);
            }
            Ok(commits)
        })
        .await
    }

    async fn read_tree(&self, oid: &str) -> Result<Vec<TreeEntry>> {
        let oid = oid.to_string();
        self.with_repo(move |repo| {
            let tree = repo
                .find_tree(Oid::from_str(&oid)?)
                .with_context(|| format!("Tree not found: {}", oid))?;

            let mut entries = Vec::with_capacity(tree.len());
            for entry in tree.iter() {
                let kind = match entry.kind() {
                    Some(ObjectType::Blob) => EntryKind::Blob,
                    Some(ObjectType::Tree) => EntryKind::Tree,
                    Some(ObjectType::Commit) => EntryKind::Commit,
                    other => anyhow::bail!("Unexpected tree entry type {:?} in {}", other, oid),
                };
                entries.push(TreeEntry {
                    name: String::from_utf8_lossy(entry.name_bytes()).into_owned(),
                    mode: format!("{:06o}", entry.filemode()),
                    kind,
                    oid: entry.id().to_string(),
                });
            }
            Ok(entries)
        })
        .await
    }

    async fn read_blob(&self, oid: &str) -> Result<Vec<u8>> {
        let oid = oid.to_string();
        self.with_repo(move |repo| {
            let blob = repo
                .find_blob(Oid::from_str(&oid)?)
                .with_context(|| format!("Blob not found: {}", oid))?;
            Ok(blob.content().to_vec())
        })
        .await
    }
}

//! Commit-tree builder.
//!
//! Materializes a local commit's snapshot as remote tree objects, uploading
//! only what the remote does not already hold. Subtrees whose id matches the
//! corresponding remote subtree are referenced as-is; blobs already present
//! in a known remote tree (or uploaded earlier in the same push) are not sent
//! again. The builder is reused across the commits of one push so that this
//! knowledge accumulates.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::domain::{Commit, EntryKind, TreeEntry};
use crate::vcs::{LocalRepo, RemoteHost};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Upload counters for one push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeBuildStats {
    pub blobs_uploaded: usize,
    pub blobs_reused: usize,
    pub trees_created: usize,
    pub trees_reused: usize,
}

pub struct TreeBuilder<'a> {
    local: &'a dyn LocalRepo,
    remote: &'a dyn RemoteHost,
    /// Object ids known to exist on the remote
    known: HashSet<String>,
    /// Remote tree listings fetched so far
    remote_trees: HashMap<String, Vec<TreeEntry>>,
    stats: TreeBuildStats,
}

impl<'a> TreeBuilder<'a> {
    pub fn new(local: &'a dyn LocalRepo, remote: &'a dyn RemoteHost) -> Self {
        Self {
            local,
            remote,
            known: HashSet::new(),
            remote_trees: HashMap::new(),
            stats: TreeBuildStats::default(),
        }
    }

    pub fn stats(&self) -> &TreeBuildStats {
        &self.stats
    }

    /// Build the remote root tree for `commit`, diffing against `base_tree`
    /// (the remote tree of the parent, if any). Returns the remote tree sha.
    pub async fn build_commit_tree(
        &mut self,
        commit: &Commit,
        base_tree: Option<&str>,
    ) -> Result<String> {
        if let Some(base) = base_tree {
            self.known.insert(base.to_string());
        }
        let tree = commit.tree.clone();
        let base = base_tree.map(str::to_string);
        self.build_tree(tree, base)
            .await
            .with_context(|| format!("Failed to build tree for commit {}", commit.short_oid()))
    }

    async fn remote_listing(&mut self, sha: &str) -> Option<HashMap<String, TreeEntry>> {
        if !self.remote_trees.contains_key(sha) {
            match self.remote.get_tree(sha).await {
                Ok(entries) => {
                    self.known.extend(
                        entries
                            .iter()
                            .filter(|e| e.kind != EntryKind::Commit)
                            .map(|e| e.oid.clone()),
                    );
                    self.remote_trees.insert(sha.to_string(), entries);
                }
                Err(e) => {
                    // Without the listing everything below is uploaded again
                    warn!("Failed to read remote tree {}: {:#}", sha, e);
                    return None;
                }
            }
        }
        self.remote_trees.get(sha).map(|entries| {
            entries
                .iter()
                .map(|e| (e.name.clone(), e.clone()))
                .collect()
        })
    }

    fn build_tree(
        &mut self,
        local_tree: String,
        remote_tree: Option<String>,
    ) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            if self.known.contains(&local_tree) {
                self.stats.trees_reused += 1;
                return Ok(local_tree);
            }

            let entries = self.local.read_tree(&local_tree).await?;
            let remote_entries = match remote_tree.as_deref() {
                Some(sha) => self.remote_listing(sha).await.unwrap_or_default(),
                None => HashMap::new(),
            };

            let mut new_entries = Vec::with_capacity(entries.len());
            for entry in entries {
                let oid = match entry.kind {
                    EntryKind::Blob => self.ensure_blob(&entry.oid).await?,
                    EntryKind::Tree => {
                        let remote_child = remote_entries
                            .get(&entry.name)
                            .filter(|r| r.kind == EntryKind::Tree)
                            .map(|r| r.oid.clone());
                        self.build_tree(entry.oid.clone(), remote_child).await?
                    }
                    // Submodule pointers reference commits in other repositories
                    EntryKind::Commit => entry.oid.clone(),
                };
                new_entries.push(TreeEntry { oid, ..entry });
            }

            let sha = self
                .remote
                .create_tree(&new_entries)
                .await
                .with_context(|| format!("Failed to create tree for {}", local_tree))?;
            if sha != local_tree {
                debug!("Remote tree {} differs from local {}", sha, local_tree);
            }
            self.stats.trees_created += 1;
            self.known.insert(sha.clone());
            Ok(sha)
        })
    }

    async fn ensure_blob(&mut self, oid: &str) -> Result<String> {
        if self.known.contains(oid) {
            self.stats.blobs_reused += 1;
            return Ok(oid.to_string());
        }

        let content = self
            .local
            .read_blob(oid)
            .await
            .with_context(|| format!("Failed to read blob {}", oid))?;
        let sha = self
            .remote
            .create_blob(&content)
            .await
            .with_context(|| format!("Failed to upload blob {}", oid))?;

        self.stats.blobs_uploaded += 1;
        self.known.insert(oid.to_string());
        self.known.insert(sha.clone());
        Ok(sha)
    }
}

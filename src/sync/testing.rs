//! In-memory collaborators for push engine tests.
//!
//! Both fakes hash objects the same way, so a commit recreated remotely with
//! identical fields gets the local commit id, as it does on GitHub.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::{FixedOffset, TimeZone};
use sha2::{Digest, Sha256};

use super::progress::ProgressSink;
use crate::domain::{Commit, EntryKind, GitHubRepo, RemoteCommit, RemoteConfig, Signature, TreeEntry};
use crate::vcs::{LocalRepo, NewCommit, RefRejected, RemoteConnector, RemoteHost};

pub const ORIGIN_URL: &str = "https://github.com/octo/demo.git";

#[derive(Debug, Clone)]
pub struct StoredCommit {
    pub tree: String,
    pub parents: Vec<String>,
    pub author: Signature,
    pub committer: Signature,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum Object {
    Blob(Vec<u8>),
    Tree(Vec<TreeEntry>),
    Commit(StoredCommit),
}

fn hash(kind: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(kind.as_bytes());
    hasher.update([0u8]);
    hasher.update(body);
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..40].to_string()
}

fn signature_line(sig: &Signature) -> String {
    format!("{} <{}> {}", sig.name, sig.email, sig.when.to_rfc3339())
}

impl Object {
    pub fn id(&self) -> String {
        match self {
            Object::Blob(content) => hash("blob", content),
            Object::Tree(entries) => {
                let body: String = entries
                    .iter()
                    .map(|e| format!("{} {} {} {}\n", e.mode, e.kind.as_str(), e.name, e.oid))
                    .collect();
                hash("tree", body.as_bytes())
            }
            Object::Commit(c) => {
                let mut body = format!("tree {}\n", c.tree);
                for parent in &c.parents {
                    body.push_str(&format!("parent {}\n", parent));
                }
                body.push_str(&format!("author {}\n", signature_line(&c.author)));
                body.push_str(&format!("committer {}\n\n", signature_line(&c.committer)));
                body.push_str(&c.message);
                hash("commit", body.as_bytes())
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    objects: HashMap<String, Object>,
}

impl ObjectStore {
    pub fn put(&mut self, object: Object) -> String {
        let id = object.id();
        self.objects.insert(id.clone(), object);
        id
    }

    pub fn get(&self, id: &str) -> Option<&Object> {
        self.objects.get(id)
    }

    pub fn commit(&self, id: &str) -> Result<&StoredCommit> {
        match self.objects.get(id) {
            Some(Object::Commit(c)) => Ok(c),
            _ => Err(anyhow!("commit {} not found", id)),
        }
    }

    pub fn tree(&self, id: &str) -> Result<&Vec<TreeEntry>> {
        match self.objects.get(id) {
            Some(Object::Tree(entries)) => Ok(entries),
            _ => Err(anyhow!("tree {} not found", id)),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.objects.contains_key(id)
    }

    /// Copy everything reachable from `id` into `target`.
    fn copy_reachable(&self, id: &str, target: &mut ObjectStore) {
        let mut pending = vec![id.to_string()];
        while let Some(id) = pending.pop() {
            if target.contains(&id) {
                continue;
            }
            let Some(object) = self.objects.get(&id) else {
                continue;
            };
            match object {
                Object::Blob(_) => {}
                Object::Tree(entries) => pending.extend(
                    entries
                        .iter()
                        .filter(|e| e.kind != EntryKind::Commit)
                        .map(|e| e.oid.clone()),
                ),
                Object::Commit(c) => {
                    pending.push(c.tree.clone());
                    pending.extend(c.parents.iter().cloned());
                }
            }
            target.objects.insert(id, object.clone());
        }
    }
}

pub fn signature(seq: i64) -> Signature {
    let offset = FixedOffset::east_opt(2 * 3600).unwrap();
    Signature {
        name: "Octo Cat".to_string(),
        email: "octo@example.com".to_string(),
        when: offset.timestamp_opt(1_714_557_600 + seq * 60, 0).unwrap(),
    }
}

fn write_tree(store: &mut ObjectStore, files: &[(String, Vec<u8>)]) -> String {
    let mut blobs: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut dirs: BTreeMap<String, Vec<(String, Vec<u8>)>> = BTreeMap::new();
    for (path, content) in files {
        match path.split_once('/') {
            Some((dir, rest)) => dirs
                .entry(dir.to_string())
                .or_default()
                .push((rest.to_string(), content.clone())),
            None => {
                blobs.insert(path.clone(), content.clone());
            }
        }
    }

    let mut entries = Vec::new();
    for (name, content) in blobs {
        let oid = store.put(Object::Blob(content));
        entries.push(TreeEntry {
            name,
            mode: "100644".to_string(),
            kind: EntryKind::Blob,
            oid,
        });
    }
    for (name, children) in dirs {
        let oid = write_tree(store, &children);
        entries.push(TreeEntry {
            name,
            mode: "040000".to_string(),
            kind: EntryKind::Tree,
            oid,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    store.put(Object::Tree(entries))
}

#[derive(Default)]
struct RepoState {
    objects: ObjectStore,
    refs: HashMap<String, String>,
    head: Option<String>,
    remotes: Vec<RemoteConfig>,
    fail_write_ref: bool,
    seq: i64,
}

/// Local repository fake.
#[derive(Clone, Default)]
pub struct MemoryRepo {
    state: Arc<Mutex<RepoState>>,
}

impl MemoryRepo {
    /// Repository on `main` with `origin` pointing at GitHub.
    pub fn new() -> Self {
        let repo = Self::default();
        {
            let mut state = repo.state.lock().unwrap();
            state.head = Some("main".to_string());
            state.remotes.push(RemoteConfig {
                name: "origin".to_string(),
                url: ORIGIN_URL.to_string(),
            });
        }
        repo
    }

    pub fn set_head(&self, branch: Option<&str>) {
        self.state.lock().unwrap().head = branch.map(str::to_string);
    }

    pub fn set_remote(&self, name: &str, url: &str) {
        let mut state = self.state.lock().unwrap();
        state.remotes.retain(|r| r.name != name);
        state.remotes.push(RemoteConfig {
            name: name.to_string(),
            url: url.to_string(),
        });
    }

    pub fn fail_write_ref(&self) {
        self.state.lock().unwrap().fail_write_ref = true;
    }

    pub fn ref_value(&self, name: &str) -> Option<String> {
        self.state.lock().unwrap().refs.get(name).cloned()
    }

    pub fn set_ref(&self, name: &str, oid: &str) {
        self.state
            .lock()
            .unwrap()
            .refs
            .insert(name.to_string(), oid.to_string());
    }

    pub fn put(&self, object: Object) -> String {
        self.state.lock().unwrap().objects.put(object)
    }

    pub fn tree_of(&self, commit: &str) -> String {
        self.state.lock().unwrap().objects.commit(commit).unwrap().tree.clone()
    }

    /// Commit `files` on top of `parent` without touching any ref.
    pub fn commit_on(&self, parent: Option<&str>, files: &[(&str, &str)], message: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let files: Vec<(String, Vec<u8>)> = files
            .iter()
            .map(|(p, c)| (p.to_string(), c.as_bytes().to_vec()))
            .collect();
        let tree = write_tree(&mut state.objects, &files);
        state.seq += 1;
        let sig = signature(state.seq);
        state.objects.put(Object::Commit(StoredCommit {
            tree,
            parents: parent.map(str::to_string).into_iter().collect(),
            author: sig.clone(),
            committer: sig,
            message: message.to_string(),
        }))
    }

    /// Commit `files` (the full snapshot) on `branch` and advance it.
    pub fn commit(&self, branch: &str, files: &[(&str, &str)], message: &str) -> String {
        let name = format!("refs/heads/{}", branch);
        let parent = self.ref_value(&name);
        let oid = self.commit_on(parent.as_deref(), files, message);
        self.set_ref(&name, &oid);
        oid
    }

    fn snapshot(&self, id: &str, target: &mut ObjectStore) {
        self.state.lock().unwrap().objects.copy_reachable(id, target);
    }
}

#[async_trait]
impl LocalRepo for MemoryRepo {
    async fn current_branch(&self) -> Result<Option<String>> {
        Ok(self.state.lock().unwrap().head.clone())
    }

    async fn list_remotes(&self) -> Result<Vec<RemoteConfig>> {
        Ok(self.state.lock().unwrap().remotes.clone())
    }

    async fn resolve_ref(&self, name: &str) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .refs
            .get(name)
            .or_else(|| state.refs.get(&format!("refs/heads/{}", name)))
            .cloned())
    }

    async fn write_ref(&self, name: &str, oid: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_write_ref {
            bail!("ref store is read-only");
        }
        state.refs.insert(name.to_string(), oid.to_string());
        Ok(())
    }

    async fn log(&self, reference: &str) -> Result<Vec<Commit>> {
        let head = self
            .resolve_ref(reference)
            .await?
            .ok_or_else(|| anyhow!("unknown ref {}", reference))?;
        let state = self.state.lock().unwrap();
        let mut log = Vec::new();
        let mut next = Some(head);
        while let Some(oid) = next {
            let c = state.objects.commit(&oid)?;
            next = c.parents.first().cloned();
            log.push(Commit {
                oid,
                tree: c.tree.clone(),
                parents: c.parents.clone(),
                author: c.author.clone(),
                committer: c.committer.clone(),
                message: c.message.clone(),
            });
        }
        Ok(log)
    }

    async fn read_tree(&self, oid: &str) -> Result<Vec<TreeEntry>> {
        Ok(self.state.lock().unwrap().objects.tree(oid)?.clone())
    }

    async fn read_blob(&self, oid: &str) -> Result<Vec<u8>> {
        match self.state.lock().unwrap().objects.get(oid) {
            Some(Object::Blob(content)) => Ok(content.clone()),
            _ => Err(anyhow!("blob {} not found", oid)),
        }
    }
}

#[derive(Default)]
struct RemoteState {
    objects: ObjectStore,
    refs: HashMap<String, String>,
    calls: HashMap<&'static str, usize>,
    failing_commits: HashSet<String>,
    fail_blobs: bool,
    uploaded_blobs: Vec<Vec<u8>>,
}

impl RemoteState {
    fn record(&mut self, op: &'static str) {
        *self.calls.entry(op).or_default() += 1;
    }

    fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        let mut pending = vec![descendant.to_string()];
        let mut seen = HashSet::new();
        while let Some(id) = pending.pop() {
            if id == ancestor {
                return true;
            }
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Ok(c) = self.objects.commit(&id) {
                pending.extend(c.parents.iter().cloned());
            }
        }
        false
    }
}

/// Remote host fake with fast-forward enforcement and call counting.
#[derive(Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<RemoteState>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `branch` point at local commit `oid`, copying its history.
    pub fn seed(&self, repo: &MemoryRepo, branch: &str, oid: &str) {
        let mut state = self.state.lock().unwrap();
        repo.snapshot(oid, &mut state.objects);
        state.refs.insert(branch.to_string(), oid.to_string());
    }

    pub fn head(&self, branch: &str) -> Option<String> {
        self.state.lock().unwrap().refs.get(branch).cloned()
    }

    pub fn calls(&self, op: &str) -> usize {
        self.state.lock().unwrap().calls.get(op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().unwrap().calls.values().sum()
    }

    pub fn uploaded_blobs(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .uploaded_blobs
            .iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }

    pub fn fail_commit_fetch(&self, sha: &str) {
        self.state.lock().unwrap().failing_commits.insert(sha.to_string());
    }

    pub fn fail_blob_uploads(&self) {
        self.state.lock().unwrap().fail_blobs = true;
    }

    pub fn commit(&self, sha: &str) -> Option<StoredCommit> {
        self.state.lock().unwrap().objects.commit(sha).ok().cloned()
    }

    /// First-parent chain of `branch`, newest first.
    pub fn history(&self, branch: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut out = Vec::new();
        let mut next = state.refs.get(branch).cloned();
        while let Some(id) = next {
            next = state
                .objects
                .commit(&id)
                .ok()
                .and_then(|c| c.parents.first().cloned());
            out.push(id);
        }
        out
    }
}

#[async_trait]
impl RemoteHost for MemoryRemote {
    async fn get_ref(&self, branch: &str) -> Result<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.record("get_ref");
        Ok(state.refs.get(branch).cloned())
    }

    async fn get_commit(&self, sha: &str) -> Result<RemoteCommit> {
        let mut state = self.state.lock().unwrap();
        state.record("get_commit");
        if state.failing_commits.contains(sha) {
            bail!("502 Bad Gateway");
        }
        let c = state.objects.commit(sha)?;
        Ok(RemoteCommit {
            sha: sha.to_string(),
            tree: c.tree.clone(),
            parents: c.parents.clone(),
        })
    }

    async fn get_tree(&self, sha: &str) -> Result<Vec<TreeEntry>> {
        let mut state = self.state.lock().unwrap();
        state.record("get_tree");
        Ok(state.objects.tree(sha)?.clone())
    }

    async fn create_blob(&self, content: &[u8]) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.record("create_blob");
        if state.fail_blobs {
            bail!("500 Internal Server Error");
        }
        state.uploaded_blobs.push(content.to_vec());
        Ok(state.objects.put(Object::Blob(content.to_vec())))
    }

    async fn create_tree(&self, entries: &[TreeEntry]) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.record("create_tree");
        for entry in entries {
            let ok = match (entry.kind, state.objects.get(&entry.oid)) {
                (EntryKind::Blob, Some(Object::Blob(_))) => true,
                (EntryKind::Tree, Some(Object::Tree(_))) => true,
                (EntryKind::Commit, _) => true,
                _ => false,
            };
            if !ok {
                bail!("422 tree.sha {} is not a valid {}", entry.oid, entry.kind.as_str());
            }
        }
        Ok(state.objects.put(Object::Tree(entries.to_vec())))
    }

    async fn create_commit(&self, commit: &NewCommit<'_>) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.record("create_commit");
        state.objects.tree(commit.tree)?;
        for parent in &commit.parents {
            state.objects.commit(parent)?;
        }
        Ok(state.objects.put(Object::Commit(StoredCommit {
            tree: commit.tree.to_string(),
            parents: commit.parents.clone(),
            author: commit.author.clone(),
            committer: commit.committer.clone(),
            message: commit.message.to_string(),
        })))
    }

    async fn create_ref(&self, branch: &str, sha: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record("create_ref");
        state.objects.commit(sha)?;
        if state.refs.contains_key(branch) {
            bail!("422 Reference already exists");
        }
        state.refs.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn update_ref(&self, branch: &str, sha: &str, force: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record("update_ref");
        state.objects.commit(sha)?;
        let current = state
            .refs
            .get(branch)
            .cloned()
            .ok_or_else(|| anyhow!("422 Reference does not exist"))?;
        if !force && !state.is_ancestor(&current, sha) {
            return Err(RefRejected {
                branch: branch.to_string(),
                message: "Update is not a fast forward".to_string(),
            }
            .into());
        }
        state.refs.insert(branch.to_string(), sha.to_string());
        Ok(())
    }
}

/// Hands out clones of one [`MemoryRemote`] and records the target repository.
pub struct MemoryConnector {
    pub remote: MemoryRemote,
    pub connects: AtomicUsize,
    pub last_repo: Mutex<Option<GitHubRepo>>,
}

impl MemoryConnector {
    pub fn new(remote: MemoryRemote) -> Self {
        Self {
            remote,
            connects: AtomicUsize::new(0),
            last_repo: Mutex::new(None),
        }
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl RemoteConnector for MemoryConnector {
    fn connect(&self, repo: &GitHubRepo, _token: &str) -> Result<Box<dyn RemoteHost>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.last_repo.lock().unwrap() = Some(repo.clone());
        Ok(Box::new(self.remote.clone()))
    }
}

#[derive(Default)]
pub struct RecordingProgress {
    pub messages: Mutex<Vec<String>>,
    pub finished: AtomicBool,
}

impl RecordingProgress {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}

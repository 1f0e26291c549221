use super::testing::*;
use super::*;
use crate::domain::{EntryKind, PushOptions, TreeEntry};
use crate::vcs::{LocalRepo, RemoteHost, StaticToken};

fn options(force: bool) -> PushOptions {
    PushOptions {
        force,
        ..Default::default()
    }
}

fn branch_options(branch: &str) -> PushOptions {
    PushOptions {
        branch: Some(branch.to_string()),
        ..Default::default()
    }
}

async fn run_push(
    repo: &MemoryRepo,
    remote: &MemoryRemote,
    options: &PushOptions,
) -> Result<String, PushError> {
    let connector = MemoryConnector::new(remote.clone());
    let token = StaticToken("ghp_test".to_string());
    let ctx = PushContext::new(repo, &token, &connector);
    push(&ctx, options).await
}

/// Local main with three commits; the remote holds the first.
fn three_commits() -> (MemoryRepo, MemoryRemote, [String; 3]) {
    let repo = MemoryRepo::new();
    let c1 = repo.commit("main", &[("README.md", "hello\n")], "init");
    let c2 = repo.commit(
        "main",
        &[("README.md", "hello\n"), ("src/lib.rs", "pub fn a() {}\n")],
        "add lib",
    );
    let c3 = repo.commit(
        "main",
        &[("README.md", "hello world\n"), ("src/lib.rs", "pub fn a() {}\n")],
        "update readme",
    );
    let remote = MemoryRemote::new();
    remote.seed(&repo, "main", &c1);
    (repo, remote, [c1, c2, c3])
}

fn oids(plan: &SyncPlan) -> Vec<String> {
    plan.commits.iter().map(|c| c.oid.clone()).collect()
}

// Resolver

#[tokio::test]
async fn test_resolver_fast_forward_returns_oldest_first() {
    let (repo, remote, [c1, c2, c3]) = three_commits();

    let plan = find_commits_to_push(&repo, &remote, "main", Some(&c1), false, 100)
        .await
        .unwrap();

    assert_eq!(oids(&plan), vec![c2, c3]);
    assert_eq!(plan.kind, SyncKind::FastForward);
    assert_eq!(plan.base.unwrap().sha, c1);
    assert!(!plan.matched_by_tree);
    // oid match needs no remote lookups
    assert_eq!(remote.total_calls(), 0);
}

#[tokio::test]
async fn test_resolver_head_at_tip_is_empty() {
    let (repo, remote, [_, _, c3]) = three_commits();

    let plan = find_commits_to_push(&repo, &remote, "main", Some(&c3), false, 100)
        .await
        .unwrap();

    assert!(plan.commits.is_empty());
    assert_eq!(plan.kind, SyncKind::FastForward);
}

#[tokio::test]
async fn test_resolver_missing_remote_branch_returns_full_history() {
    let (repo, remote, [c1, c2, c3]) = three_commits();

    let plan = find_commits_to_push(&repo, &remote, "main", None, false, 100)
        .await
        .unwrap();

    assert_eq!(oids(&plan), vec![c1, c2, c3]);
    assert_eq!(plan.kind, SyncKind::NewBranch);
    assert!(plan.base.is_none());
}

#[tokio::test]
async fn test_resolver_tree_match_after_rebase() {
    let (repo, remote, [c1, c2, c3]) = three_commits();
    // Same content as c2 under a different commit id
    let rebased = repo.commit_on(
        Some(&c1),
        &[("README.md", "hello\n"), ("src/lib.rs", "pub fn a() {}\n")],
        "add lib (amended)",
    );
    remote.seed(&repo, "main", &rebased);

    let plan = find_commits_to_push(&repo, &remote, "main", Some(&rebased), false, 100)
        .await
        .unwrap();

    assert_eq!(oids(&plan), vec![c3]);
    assert!(plan.matched_by_tree);
    let base = plan.base.unwrap();
    assert_eq!(base.sha, rebased);
    assert_eq!(base.tree, repo.tree_of(&c2));
}

#[tokio::test]
async fn test_resolver_divergence_rejected_without_force() {
    let (repo, remote, [c1, _, _]) = three_commits();
    let theirs = repo.commit_on(Some(&c1), &[("OTHER.md", "theirs\n")], "their work");
    remote.seed(&repo, "main", &theirs);

    let err = find_commits_to_push(&repo, &remote, "main", Some(&theirs), false, 100)
        .await
        .unwrap_err();

    assert!(matches!(err, PushFailure::Rejected { .. }));
    assert!(err.to_string().contains("rejected"));
}

#[tokio::test]
async fn test_resolver_force_finds_common_ancestor() {
    let (repo, remote, [c1, c2, c3]) = three_commits();
    let theirs = repo.commit_on(Some(&c1), &[("OTHER.md", "theirs\n")], "their work");
    remote.seed(&repo, "main", &theirs);

    let plan = find_commits_to_push(&repo, &remote, "main", Some(&theirs), true, 100)
        .await
        .unwrap();

    assert_eq!(plan.kind, SyncKind::CommonAncestor);
    assert_eq!(oids(&plan), vec![c2, c3]);
    assert_eq!(plan.base.unwrap().sha, c1);
    assert!(!plan.search_truncated);
}

#[tokio::test]
async fn test_resolver_force_without_shared_content_is_orphan() {
    let (repo, _, [c1, c2, c3]) = three_commits();
    let unrelated = repo.commit_on(None, &[("x.txt", "x\n")], "unrelated");
    let remote = MemoryRemote::new();
    remote.seed(&repo, "main", &unrelated);

    let plan = find_commits_to_push(&repo, &remote, "main", Some(&unrelated), true, 100)
        .await
        .unwrap();

    assert_eq!(plan.kind, SyncKind::Orphan);
    assert_eq!(oids(&plan), vec![c1, c2, c3]);
    assert!(plan.base.is_none());
    assert!(!plan.search_truncated);
}

/// Remote chain of `len` commits with content unknown locally.
fn unrelated_chain(repo: &MemoryRepo, len: usize) -> Vec<String> {
    let mut chain: Vec<String> = Vec::new();
    for i in 0..len {
        let content = format!("remote {}\n", i);
        let oid = repo.commit_on(
            chain.last().map(String::as_str),
            &[("remote.txt", content.as_str())],
            &format!("remote {}", i),
        );
        chain.push(oid);
    }
    chain
}

#[tokio::test]
async fn test_ancestor_search_reports_truncation() {
    let (repo, _, _) = three_commits();
    let chain = unrelated_chain(&repo, 5);
    let head = chain.last().unwrap().clone();
    let remote = MemoryRemote::new();
    remote.seed(&repo, "main", &head);

    let log = repo.log("refs/heads/main").await.unwrap();
    let search = find_common_ancestor(&log, &remote, &head, 2).await;
    assert_eq!(search, AncestorSearch { found: None, truncated: true });
    assert_eq!(remote.calls("get_commit"), 2);

    // Walking the whole chain is not a truncation
    let search = find_common_ancestor(&log, &remote, &head, 5).await;
    assert!(!search.truncated);

    let plan = find_commits_to_push(&repo, &remote, "main", Some(&head), true, 2)
        .await
        .unwrap();
    assert_eq!(plan.kind, SyncKind::Orphan);
    assert!(plan.search_truncated);
}

#[tokio::test]
async fn test_ancestor_search_fetch_failure_means_no_ancestor() {
    let (repo, _, [c1, _, _]) = three_commits();
    let theirs = repo.commit_on(Some(&c1), &[("OTHER.md", "theirs\n")], "their work");
    let remote = MemoryRemote::new();
    remote.seed(&repo, "main", &theirs);
    remote.fail_commit_fetch(&c1);

    let log = repo.log("refs/heads/main").await.unwrap();
    let search = find_common_ancestor(&log, &remote, &theirs, 100).await;

    assert_eq!(search, AncestorSearch::default());
}

#[tokio::test]
async fn test_ancestor_search_prefers_newest_local_match() {
    let (repo, remote, [c1, c2, c3]) = three_commits();
    // Remote chain: rebuilt c2 content on top of c1
    let rebuilt = repo.commit_on(
        Some(&c1),
        &[("README.md", "hello\n"), ("src/lib.rs", "pub fn a() {}\n")],
        "rebuilt",
    );
    let theirs = repo.commit_on(Some(&rebuilt), &[("OTHER.md", "x\n")], "their work");
    remote.seed(&repo, "main", &theirs);

    let log = repo.log("refs/heads/main").await.unwrap();
    let search = find_common_ancestor(&log, &remote, &theirs, 100).await;

    let found = search.found.unwrap();
    assert_eq!(found.remote_sha, rebuilt);
    assert_eq!(log[found.local_index].oid, c2);
    assert_ne!(log[found.local_index].oid, c3);
}

// Tree builder

#[tokio::test]
async fn test_tree_builder_uploads_only_changed_blobs() {
    let repo = MemoryRepo::new();
    let base = repo.commit(
        "main",
        &[
            ("README.md", "hello\n"),
            ("docs/guide.md", "guide\n"),
            ("src/lib.rs", "mod util;\n"),
            ("src/util.rs", "old\n"),
        ],
        "base",
    );
    let next = repo.commit(
        "main",
        &[
            ("README.md", "hello\n"),
            ("docs/guide.md", "guide\n"),
            ("src/lib.rs", "mod util;\n"),
            ("src/util.rs", "new\n"),
        ],
        "change util",
    );
    let remote = MemoryRemote::new();
    remote.seed(&repo, "main", &base);

    let commit = repo
        .log("refs/heads/main")
        .await
        .unwrap()
        .into_iter()
        .find(|c| c.oid == next)
        .unwrap();
    let mut builder = TreeBuilder::new(&repo, &remote);
    let tree = builder
        .build_commit_tree(&commit, Some(&repo.tree_of(&base)))
        .await
        .unwrap();

    assert_eq!(tree, commit.tree);
    assert_eq!(remote.uploaded_blobs(), vec!["new\n".to_string()]);
    // root and src are rebuilt, docs is referenced as-is
    assert_eq!(remote.calls("create_tree"), 2);
    let stats = builder.stats();
    assert_eq!(stats.blobs_uploaded, 1);
    assert_eq!(stats.trees_created, 2);
    assert_eq!(stats.trees_reused, 1);
    assert_eq!(stats.blobs_reused, 2);
}

#[tokio::test]
async fn test_tree_builder_without_base_uploads_everything_once() {
    let repo = MemoryRepo::new();
    repo.commit(
        "main",
        &[("a.txt", "same\n"), ("b.txt", "same\n"), ("dir/c.txt", "other\n")],
        "init",
    );
    let remote = MemoryRemote::new();
    let commit = repo.log("main").await.unwrap().remove(0);

    let mut builder = TreeBuilder::new(&repo, &remote);
    let tree = builder.build_commit_tree(&commit, None).await.unwrap();

    assert_eq!(tree, commit.tree);
    // identical content is uploaded once
    assert_eq!(remote.calls("create_blob"), 2);
    assert_eq!(builder.stats().blobs_reused, 1);
}

#[tokio::test]
async fn test_tree_builder_passes_submodules_through() {
    let repo = MemoryRepo::new();
    let blob = repo.put(Object::Blob(b"[submodule]\n".to_vec()));
    let gitlink = "5eb1c0ffee5eb1c0ffee5eb1c0ffee5eb1c0ffee".to_string();
    let tree = repo.put(Object::Tree(vec![
        TreeEntry {
            name: ".gitmodules".to_string(),
            mode: "100644".to_string(),
            kind: EntryKind::Blob,
            oid: blob,
        },
        TreeEntry {
            name: "vendor".to_string(),
            mode: "160000".to_string(),
            kind: EntryKind::Commit,
            oid: gitlink.clone(),
        },
    ]));
    let sig = signature(1);
    let oid = repo.put(Object::Commit(StoredCommit {
        tree: tree.clone(),
        parents: vec![],
        author: sig.clone(),
        committer: sig,
        message: "add submodule".to_string(),
    }));
    repo.set_ref("refs/heads/main", &oid);
    let remote = MemoryRemote::new();
    let commit = repo.log("main").await.unwrap().remove(0);

    let mut builder = TreeBuilder::new(&repo, &remote);
    let built = builder.build_commit_tree(&commit, None).await.unwrap();

    assert_eq!(built, tree);
    assert_eq!(remote.calls("create_blob"), 1);
    let entries = remote.get_tree(&built).await.unwrap();
    let vendor = entries.iter().find(|e| e.name == "vendor").unwrap();
    assert_eq!(vendor.oid, gitlink);
    assert_eq!(vendor.kind, EntryKind::Commit);
}

// Orchestrator

#[tokio::test]
async fn test_push_fast_forward_then_up_to_date() {
    let (repo, remote, [c1, _, c3]) = three_commits();

    let summary = run_push(&repo, &remote, &options(false)).await.unwrap();
    assert_eq!(
        summary,
        format!(
            "To {}\n   {}..{}  main -> main",
            ORIGIN_URL,
            &c1[..7],
            &c3[..7]
        )
    );
    assert_eq!(remote.head("main"), Some(c3.clone()));
    assert_eq!(remote.calls("create_commit"), 2);

    let again = run_push(&repo, &remote, &options(false)).await.unwrap();
    assert_eq!(again, UP_TO_DATE);
    assert_eq!(remote.calls("create_commit"), 2);
    assert_eq!(remote.calls("update_ref"), 1);
}

#[tokio::test]
async fn test_push_keeps_parent_chain() {
    let (repo, remote, [c1, c2, c3]) = three_commits();

    run_push(&repo, &remote, &options(false)).await.unwrap();

    assert_eq!(remote.history("main"), vec![c3, c2, c1]);
}

#[tokio::test]
async fn test_push_updates_tracking_ref() {
    let (repo, remote, [_, _, c3]) = three_commits();

    run_push(&repo, &remote, &options(false)).await.unwrap();

    assert_eq!(repo.ref_value("refs/remotes/origin/main"), Some(c3));
}

#[tokio::test]
async fn test_tracking_ref_failure_is_not_fatal() {
    let (repo, remote, [_, _, c3]) = three_commits();
    repo.fail_write_ref();

    let summary = run_push(&repo, &remote, &options(false)).await.unwrap();

    assert!(summary.contains("main -> main"));
    assert_eq!(remote.head("main"), Some(c3));
}

#[tokio::test]
async fn test_push_after_rebase_onto_matching_content() {
    let (repo, remote, [c1, _, c3]) = three_commits();
    let rebased = repo.commit_on(
        Some(&c1),
        &[("README.md", "hello\n"), ("src/lib.rs", "pub fn a() {}\n")],
        "add lib (amended)",
    );
    remote.seed(&repo, "main", &rebased);

    let summary = run_push(&repo, &remote, &options(false)).await.unwrap();

    assert!(!summary.contains("forced"));
    let history = remote.history("main");
    assert_eq!(history.len(), 3);
    assert_eq!(history[1], rebased);
    let head = remote.commit(&history[0]).unwrap();
    assert_eq!(head.tree, repo.tree_of(&c3));
    assert_eq!(head.message, "update readme");
}

#[tokio::test]
async fn test_diverged_push_is_rejected_and_remote_untouched() {
    let (repo, remote, [c1, _, _]) = three_commits();
    let theirs = repo.commit_on(Some(&c1), &[("OTHER.md", "theirs\n")], "their work");
    remote.seed(&repo, "main", &theirs);

    let err = run_push(&repo, &remote, &options(false)).await.unwrap_err();

    assert!(err.is_rejected());
    let msg = err.to_string();
    assert!(msg.starts_with("Push failed: "));
    assert!(msg.contains("Updates were rejected"));
    assert_eq!(remote.head("main"), Some(theirs));
    assert_eq!(remote.calls("create_commit"), 0);
}

#[tokio::test]
async fn test_forced_push_rebuilds_on_common_ancestor() {
    let (repo, remote, [c1, c2, c3]) = three_commits();
    let theirs = repo.commit_on(Some(&c1), &[("OTHER.md", "theirs\n")], "their work");
    remote.seed(&repo, "main", &theirs);

    let summary = run_push(&repo, &remote, &options(true)).await.unwrap();

    assert!(summary.ends_with(&format!(
        " + {}...{} main -> main (forced update)",
        &theirs[..7],
        &c3[..7]
    )));
    assert_eq!(remote.history("main"), vec![c3, c2, c1]);
    assert_eq!(remote.calls("create_commit"), 2);
}

#[tokio::test]
async fn test_forced_push_without_shared_content_uploads_orphan_history() {
    let (repo, _, [c1, c2, c3]) = three_commits();
    let chain = unrelated_chain(&repo, 3);
    let remote = MemoryRemote::new();
    remote.seed(&repo, "main", chain.last().unwrap());

    run_push(&repo, &remote, &options(true)).await.unwrap();

    assert_eq!(remote.history("main"), vec![c3, c2, c1]);
}

#[tokio::test]
async fn test_forced_push_reports_truncated_search() {
    let (repo, _, [_, _, c3]) = three_commits();
    let chain = unrelated_chain(&repo, 4);
    let remote = MemoryRemote::new();
    remote.seed(&repo, "main", chain.last().unwrap());
    let connector = MemoryConnector::new(remote.clone());
    let token = StaticToken("ghp_test".to_string());
    let progress = RecordingProgress::default();
    let ctx = PushContext::new(&repo, &token, &connector)
        .with_progress(&progress)
        .with_max_ancestor_depth(2);

    push(&ctx, &options(true)).await.unwrap();

    assert!(progress
        .messages()
        .iter()
        .any(|m| m.contains("no shared history within 2 remote commits")));
    assert_eq!(remote.head("main"), Some(c3));
}

#[tokio::test]
async fn test_forced_rewind_moves_ref_without_new_commits() {
    let (repo, remote, [c1, _, c3]) = three_commits();
    remote.seed(&repo, "main", &c3);
    // Local branch reset back to c1
    repo.set_ref("refs/heads/main", &c1);

    let err = run_push(&repo, &remote, &options(false)).await.unwrap_err();
    assert!(err.is_rejected());

    let summary = run_push(&repo, &remote, &options(true)).await.unwrap();
    assert!(summary.ends_with(&format!(
        " + {}...{} main -> main (forced update)",
        &c3[..7],
        &c1[..7]
    )));
    assert_eq!(remote.head("main"), Some(c1));
    assert_eq!(remote.calls("create_commit"), 0);
}

#[tokio::test]
async fn test_new_branch_reuses_default_branch() {
    let (repo, remote, [c1, _, _]) = three_commits();
    repo.set_ref("refs/heads/feature", &c1);
    let f1 = repo.commit(
        "feature",
        &[("README.md", "hello\n"), ("FEATURE.md", "feature\n")],
        "feature work",
    );

    let summary = run_push(&repo, &remote, &branch_options("feature"))
        .await
        .unwrap();

    assert_eq!(
        summary,
        format!("To {}\n * [new branch]      feature -> feature", ORIGIN_URL)
    );
    assert_eq!(remote.history("feature"), vec![f1, c1]);
    assert_eq!(remote.uploaded_blobs(), vec!["feature\n".to_string()]);
    assert_eq!(remote.calls("create_ref"), 1);
}

#[tokio::test]
async fn test_new_branch_at_default_head_creates_ref_only() {
    let (repo, remote, [c1, _, _]) = three_commits();
    repo.set_ref("refs/heads/release", &c1);

    run_push(&repo, &remote, &branch_options("release"))
        .await
        .unwrap();

    assert_eq!(remote.head("release"), Some(c1));
    assert_eq!(remote.calls("create_commit"), 0);
}

#[tokio::test]
async fn test_unrelated_new_branch_uploads_full_history() {
    let (repo, remote, _) = three_commits();
    let d1 = repo.commit("docs", &[("index.md", "docs\n")], "docs root");
    let d2 = repo.commit("docs", &[("index.md", "docs v2\n")], "docs update");

    run_push(&repo, &remote, &branch_options("docs"))
        .await
        .unwrap();

    assert_eq!(remote.history("docs"), vec![d2, d1]);
}

#[tokio::test]
async fn test_empty_remote_repository_is_rejected_up_front() {
    let (repo, _, _) = three_commits();
    let remote = MemoryRemote::new();

    let err = run_push(&repo, &remote, &options(false)).await.unwrap_err();

    assert!(matches!(err.failure(), PushFailure::EmptyRepository { .. }));
    assert!(err.to_string().contains("octo/demo is empty"));
    assert_eq!(remote.calls("create_blob"), 0);
    assert_eq!(remote.calls("create_ref"), 0);
}

#[tokio::test]
async fn test_missing_token_fails_before_network() {
    let (repo, remote, _) = three_commits();
    let connector = MemoryConnector::new(remote.clone());
    let token = StaticToken("   ".to_string());
    let progress = RecordingProgress::default();
    let ctx = PushContext::new(&repo, &token, &connector).with_progress(&progress);

    let err = push(&ctx, &options(false)).await.unwrap_err();

    assert!(matches!(err.failure(), PushFailure::NoCredentials));
    assert_eq!(connector.connect_count(), 0);
    assert_eq!(remote.total_calls(), 0);
    assert!(progress.is_finished());
}

#[tokio::test]
async fn test_configuration_errors() {
    let (repo, remote, _) = three_commits();

    let err = run_push(
        &repo,
        &remote,
        &PushOptions {
            remote: "upstream".to_string(),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_string(), "Push failed: Remote 'upstream' not found");

    repo.set_remote("origin", "https://gitlab.com/octo/demo.git");
    let err = run_push(&repo, &remote, &options(false)).await.unwrap_err();
    assert!(matches!(err.failure(), PushFailure::UnsupportedRemote(_)));

    repo.set_remote("origin", ORIGIN_URL);
    repo.set_head(None);
    let err = run_push(&repo, &remote, &options(false)).await.unwrap_err();
    assert!(matches!(err.failure(), PushFailure::NoBranch));

    let err = run_push(&repo, &remote, &branch_options("nope")).await.unwrap_err();
    assert!(matches!(err.failure(), PushFailure::UnknownBranch(_)));

    assert_eq!(remote.total_calls(), 0);
}

#[tokio::test]
async fn test_connector_receives_parsed_repository() {
    let (repo, remote, _) = three_commits();
    repo.set_remote("origin", "git@github.com:octo/demo.git");
    let connector = MemoryConnector::new(remote.clone());
    let token = StaticToken("ghp_test".to_string());
    let ctx = PushContext::new(&repo, &token, &connector);

    push(&ctx, &options(false)).await.unwrap();

    let target = connector.last_repo.lock().unwrap().clone().unwrap();
    assert_eq!(target.full_name(), "octo/demo");
}

#[tokio::test]
async fn test_upload_failure_leaves_ref_untouched_and_finishes_progress() {
    let (repo, remote, [c1, _, _]) = three_commits();
    remote.fail_blob_uploads();
    let connector = MemoryConnector::new(remote.clone());
    let token = StaticToken("ghp_test".to_string());
    let progress = RecordingProgress::default();
    let ctx = PushContext::new(&repo, &token, &connector).with_progress(&progress);

    let err = push(&ctx, &options(false)).await.unwrap_err();

    assert!(err.to_string().starts_with("Push failed: "));
    let chain = format!("{:#}", anyhow::Error::new(err));
    assert!(chain.contains("500 Internal Server Error"));
    assert_eq!(remote.head("main"), Some(c1));
    assert_eq!(remote.calls("update_ref"), 0);
    assert!(progress.is_finished());
}

#[tokio::test]
async fn test_progress_reports_commit_counts() {
    let (repo, remote, _) = three_commits();
    let connector = MemoryConnector::new(remote.clone());
    let token = StaticToken("ghp_test".to_string());
    let progress = RecordingProgress::default();
    let ctx = PushContext::new(&repo, &token, &connector).with_progress(&progress);

    push(&ctx, &options(false)).await.unwrap();

    let messages = progress.messages();
    assert!(messages.iter().any(|m| m == "Enumerating commits: 2, done."));
    assert!(messages.iter().any(|m| m.contains("Writing commits: 100% (2/2), done.")));
    assert!(progress.is_finished());
}

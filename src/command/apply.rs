use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

use crate::cli;
use crate::patch::{parse_edit_response, Matcher, MatcherTuning, PatchResult};

/// Read a response from `path`, or stdin when absent or `-`.
pub fn read_response(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read response file: {}", path.display())),
        _ => {
            let mut response = String::new();
            std::io::stdin()
                .read_to_string(&mut response)
                .context("Failed to read response from stdin")?;
            Ok(response)
        }
    }
}

/// Join a path proposed by a model onto the workspace root. Absolute paths
/// and paths leaving the root are refused.
fn workspace_path(root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    let mut joined = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (joined != root).then_some(joined)
}

/// Current contents of the referenced files that exist in the workspace.
fn load_files(root: &Path, paths: &[String]) -> Result<HashMap<String, String>> {
    let mut files = HashMap::new();
    for path in paths {
        let Some(full) = workspace_path(root, path) else {
            continue;
        };
        if full.is_file() {
            let content = std::fs::read_to_string(&full)
                .with_context(|| format!("Failed to read {}", full.display()))?;
            files.insert(path.clone(), content);
        }
    }
    Ok(files)
}

fn print_result(result: &PatchResult) {
    let marker = match (result.success, result.applied_blocks) {
        (true, _) => "✅",
        (false, 0) => "❌",
        (false, _) => "⚠️ ",
    };
    let kind = if result.is_new_file { " (new file)" } else { "" };
    println!(
        "{} {}{}: {} applied, {} failed",
        marker,
        result.file_path,
        kind,
        result.applied_blocks,
        result.failed_blocks.len()
    );
    for block in &result.failed_blocks {
        println!("     ✗ {}", block.preview());
    }
    for error in &result.errors {
        println!("     {}", error);
    }
}

/// Outcome counts of one `apply` run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ApplySummary {
    pub written: usize,
    pub failed: usize,
}

/// Parse `response`, apply it under `root`, and write changed files unless
/// `dry_run`.
pub fn apply_response(
    root: &Path,
    response: &str,
    tuning: MatcherTuning,
    dry_run: bool,
) -> Result<ApplySummary> {
    // The first pass only collects paths; the second sees their contents
    let paths: Vec<String> = parse_edit_response(response, &HashMap::new())
        .changed_files
        .into_iter()
        .map(|f| f.path)
        .collect();
    if paths.is_empty() {
        bail!("No file edits found in the response");
    }

    let files = load_files(root, &paths)?;
    let parsed = parse_edit_response(response, &files);
    let patches: Vec<_> = parsed
        .changed_files
        .iter()
        .map(|f| f.to_patch_block())
        .collect();

    let results = Matcher::new(tuning).apply_patches(&patches, &files);

    // Later patches to a path build on earlier ones; only the last is written
    let mut final_content: HashMap<&str, &PatchResult> = HashMap::new();
    let mut summary = ApplySummary::default();
    for result in &results {
        print_result(result);
        if !result.success {
            summary.failed += 1;
        }
        if result.success || result.applied_blocks > 0 {
            final_content.insert(result.file_path.as_str(), result);
        }
    }

    for (path, result) in final_content {
        if result.patched_content == result.original_content && !result.is_new_file {
            debug!("{} unchanged", path);
            continue;
        }
        let Some(full) = workspace_path(root, path) else {
            warn!("Refusing to write outside the workspace: {}", path);
            summary.failed += 1;
            continue;
        };
        if dry_run {
            println!("   would write {}", path);
            summary.written += 1;
            continue;
        }
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(&full, &result.patched_content)
            .with_context(|| format!("Failed to write {}", full.display()))?;
        summary.written += 1;
    }

    if !parsed.message.is_empty() {
        println!("\n{}", parsed.message);
    }

    Ok(summary)
}

pub async fn run_apply(
    response_path: Option<PathBuf>,
    workspace_root: Option<String>,
    tuning: MatcherTuning,
    dry_run: bool,
) -> Result<()> {
    let root = cli::resolve_repo_root(workspace_root)?;
    let response = read_response(response_path.as_deref())?;

    let summary = apply_response(&root, &response, tuning, dry_run)?;

    let verb = if dry_run { "would be written" } else { "written" };
    println!("\n{} file(s) {}, {} with failures", summary.written, verb, summary.failed);
    if summary.failed > 0 {
        bail!("{} file(s) could not be fully patched", summary.failed);
    }
    Ok(())
}

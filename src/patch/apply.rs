//! Per-file patch application.

use std::collections::HashMap;

use tracing::debug;

use super::matcher::Matcher;
use super::types::{PatchBlock, PatchResult};

impl Matcher {
    /// Apply one file's patch to `original_content`.
    ///
    /// Whole-file modes bypass matching: a new file with `full_content`
    /// becomes that content (its original is empty), and `full_content` with
    /// no blocks replaces an existing file.
    pub fn apply_patch(&self, original_content: &str, patch: &PatchBlock) -> PatchResult {
        let mut result = PatchResult {
            file_path: patch.file_path.clone(),
            original_content: original_content.to_string(),
            is_new_file: patch.is_new_file,
            ..Default::default()
        };

        if patch.is_new_file {
            result.original_content = String::new();
            match &patch.full_content {
                Some(content) => {
                    result.patched_content = content.clone();
                    result.applied_blocks = 1;
                    result.success = true;
                }
                None => {
                    result
                        .errors
                        .push(format!("New file {} has no content", patch.file_path));
                }
            }
            return result;
        }

        if let (Some(content), true) = (&patch.full_content, patch.blocks.is_empty()) {
            debug!("Replacing {} wholesale", patch.file_path);
            result.patched_content = content.clone();
            result.applied_blocks = 1;
            result.success = true;
            return result;
        }

        if patch.blocks.is_empty() {
            result.patched_content = original_content.to_string();
            result
                .errors
                .push(format!("No changes given for {}", patch.file_path));
            return result;
        }

        let outcome = self.apply_all(original_content, &patch.blocks);
        result.success = outcome.success;
        result.patched_content = outcome.content;
        result.applied_blocks = outcome.applied_count;
        result.failed_blocks = outcome.failed_blocks;
        result.errors = outcome.errors;
        result
    }

    /// Apply patches against `files` (path to current content). Patches to
    /// the same path build on each other in order.
    pub fn apply_patches(
        &self,
        patches: &[PatchBlock],
        files: &HashMap<String, String>,
    ) -> Vec<PatchResult> {
        let mut working: HashMap<&str, String> = HashMap::new();
        let mut results = Vec::with_capacity(patches.len());

        for patch in patches {
            let path = patch.file_path.as_str();
            let current = working
                .get(path)
                .or_else(|| files.get(path))
                .cloned();

            let needs_original = !patch.is_new_file
                && !(patch.full_content.is_some() && patch.blocks.is_empty());
            let result = match current {
                Some(content) => self.apply_patch(&content, patch),
                None if needs_original => PatchResult {
                    file_path: patch.file_path.clone(),
                    failed_blocks: patch.blocks.clone(),
                    errors: vec![format!("File not found: {}", patch.file_path)],
                    ..Default::default()
                },
                None => self.apply_patch("", patch),
            };

            if result.success || result.applied_blocks > 0 {
                working.insert(path, result.patched_content.clone());
            }
            results.push(result);
        }
        results
    }
}

/// Apply one file's patch with the default tuning.
pub fn apply_patch_block(original_content: &str, patch: &PatchBlock) -> PatchResult {
    Matcher::default().apply_patch(original_content, patch)
}

/// Apply many patches with the default tuning.
pub fn apply_multiple_patches(
    patches: &[PatchBlock],
    files: &HashMap<String, String>,
) -> Vec<PatchResult> {
    Matcher::default().apply_patches(patches, files)
}

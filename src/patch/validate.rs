//! Structural checks on a model response before it is applied.

use serde::Serialize;

use super::parser::{
    file_header, LEGACY_END, LEGACY_START, NEW_FILE_END, NEW_FILE_START, REPLACE_MARKER,
    SEARCH_MARKER, SEPARATOR,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    /// Problems that lose edits (unbalanced markers)
    pub errors: Vec<String>,
    /// Suspicious but parseable structure
    pub warnings: Vec<String>,
}

#[derive(Default)]
struct Counts {
    search: usize,
    separators: usize,
    replace: usize,
    new_file_open: usize,
    new_file_close: usize,
    legacy_open: usize,
    legacy_close: usize,
    outside_section: usize,
    empty_replace: usize,
}

/// Count markers and report mismatches. Parsing tolerates all of these;
/// this only tells the caller some edits will be dropped.
pub fn validate_response(response: &str) -> ValidationResult {
    let mut counts = Counts::default();
    let mut in_section = false;
    let mut in_replace = false;
    let mut replace_has_text = false;

    for line in response.lines() {
        let trimmed = line.trim();
        if file_header(trimmed).is_some() {
            in_section = true;
        } else if trimmed.starts_with(SEARCH_MARKER) {
            counts.search += 1;
            if !in_section {
                counts.outside_section += 1;
            }
            in_replace = false;
        } else if trimmed == SEPARATOR {
            counts.separators += 1;
            in_replace = true;
            replace_has_text = false;
        } else if trimmed.starts_with(REPLACE_MARKER) {
            counts.replace += 1;
            if in_replace && !replace_has_text {
                counts.empty_replace += 1;
            }
            in_replace = false;
        } else if trimmed.starts_with(NEW_FILE_START) {
            counts.new_file_open += 1;
            if !in_section {
                counts.outside_section += 1;
            }
        } else if trimmed.starts_with(NEW_FILE_END) {
            counts.new_file_close += 1;
        } else if trimmed.starts_with(LEGACY_END) {
            counts.legacy_close += 1;
        } else if trimmed.starts_with(LEGACY_START) {
            counts.legacy_open += 1;
        } else if in_replace && !trimmed.is_empty() {
            replace_has_text = true;
        }
    }

    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if counts.search != counts.replace {
        errors.push(format!(
            "Mismatched markers: {} SEARCH vs {} REPLACE",
            counts.search, counts.replace
        ));
    }
    if counts.separators < counts.search {
        errors.push(format!(
            "Found {} SEARCH markers but only {} separators",
            counts.search, counts.separators
        ));
    }
    if counts.new_file_open != counts.new_file_close {
        errors.push(format!(
            "Mismatched NEW_FILE markers: {} opening vs {} closing",
            counts.new_file_open, counts.new_file_close
        ));
    }

    if counts.outside_section > 0 {
        warnings.push(format!(
            "{} block(s) appear before any file header and will be ignored",
            counts.outside_section
        ));
    }
    if counts.legacy_open > counts.legacy_close {
        warnings.push(format!(
            "{} legacy file block(s) are not closed",
            counts.legacy_open - counts.legacy_close
        ));
    }
    if counts.empty_replace > 0 {
        warnings.push(format!(
            "{} block(s) have an empty REPLACE section and delete the matched text",
            counts.empty_replace
        ));
    }
    if counts.search + counts.new_file_open + counts.legacy_open == 0 {
        warnings.push("No edit markers found".to_string());
    }

    ValidationResult {
        is_valid: errors.is_empty(),
        errors,
        warnings,
    }
}

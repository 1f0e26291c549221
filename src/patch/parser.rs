//! Parser for model responses that propose file edits.
//!
//! Two dialects are understood and never mixed. A response containing
//! `<<<<<<< SEARCH` (or a `<<<<<<< NEW_FILE` block) is read as per-file
//! search/replace sections:
//!
//! ```text
//! ### FILE: src/lib.rs
//! REASON: one line explanation
//! <<<<<<< SEARCH line 12
//! old text
//! =======
//! new text
//! >>>>>>> REPLACE
//! ```
//!
//! Anything else is read as legacy whole-file blocks delimited by
//! `---FILE: path---` and `---END FILE: path---`.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use super::types::{PatchBlock, SearchReplaceBlock};

pub const SEARCH_MARKER: &str = "<<<<<<< SEARCH";
pub const SEPARATOR: &str = "=======";
pub const REPLACE_MARKER: &str = ">>>>>>> REPLACE";
pub const NEW_FILE_START: &str = "<<<<<<< NEW_FILE";
pub const NEW_FILE_END: &str = ">>>>>>> NEW_FILE";
pub const LEGACY_START: &str = "---FILE:";
pub const LEGACY_END: &str = "---END FILE:";

/// Leftover text shorter than this does not count as an explanation.
const MIN_MESSAGE_CHARS: usize = 10;

/// Edits for one file extracted from a response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedFile {
    pub path: String,
    pub blocks: Vec<SearchReplaceBlock>,
    /// Whole-file content (new file, or legacy replacement)
    pub full_content: Option<String>,
    pub is_new_file: bool,
    pub reason: Option<String>,
    /// Content the caller supplied for this path
    pub original_content: Option<String>,
}

impl ParsedFile {
    pub fn to_patch_block(&self) -> PatchBlock {
        PatchBlock {
            file_path: self.path.clone(),
            blocks: self.blocks.clone(),
            is_new_file: self.is_new_file,
            full_content: self.full_content.clone(),
            explanation: self.reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseResult {
    pub changed_files: Vec<ParsedFile>,
    /// Explanation left after removing all edit structure
    pub message: String,
    pub raw: String,
    pub used_patch_format: bool,
}

struct Patterns {
    file_header: Regex,
    reason_line: Regex,
    line_hint: Regex,
    legacy_block: Regex,
    legacy_start: Regex,
    reasons: Vec<Regex>,
    cleanup_patch: Vec<Regex>,
    cleanup_legacy: Vec<Regex>,
    cleanup_metadata: Vec<Regex>,
    blank_runs: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        let reasons = [
            // **Reason for src/a.rs**: ...
            r"(?m)^\*\*(?:Reason|REASON) for `?([^`*\n]+?)`?\*\*\s*[:：]\s*(.+?)\s*$",
            // Reason for src/a.rs: ...
            r"(?m)^(?:Reason|REASON) for `?([^`:\n]+?)`?\s*[:：]\s*(.+?)\s*$",
            // **src/a.rs 修改原因**：...
            r"(?m)^\*\*`?([^`*\n]+?)`?\s*(?:的修改原因|修改原因|的原因|原因)\*\*\s*[:：]\s*(.+?)\s*$",
            // src/a.rs 修改原因：...
            r"(?m)^`?([^`\s:：*]+?)`?\s*(?:的修改原因|修改原因|的原因|原因)\s*[:：]\s*(.+?)\s*$",
            // ### src/a.rs, then a reason line
            r"(?m)^#{2,6}\s*(?:(?:FILE|File|文件)\s*[:：]\s*)?`?([^`\n]+?)`?[ \t]*\n+[ \t]*(?:\*\*)?(?:REASON|Reason|原因)(?:\*\*)?\s*[:：]\s*(.+?)\s*$",
            // - `src/a.rs`: ...
            r"(?m)^\s*[-*]\s+(?:\*\*)?`?([^`\s:：*]+)`?(?:\*\*)?\s*[:：]\s*(.+?)\s*$",
            // File: src/a.rs - ...
            r"(?m)^(?:File|FILE|文件)\s*[:：]\s*`?([^`\n]+?)`?\s+[-—–]+\s+(.+?)\s*$",
        ];
        // Edit structure of each dialect; only the detected dialect's set runs
        let cleanup_patch = [
            r"(?s)<<<<<<< SEARCH.*?>>>>>>> REPLACE[^\n]*",
            r"(?s)<<<<<<< NEW_FILE.*?>>>>>>> NEW_FILE[^\n]*",
            r"(?m)^[ \t]*(?:<<<<<<< SEARCH|=======|>>>>>>> REPLACE|<<<<<<< NEW_FILE|>>>>>>> NEW_FILE)[^\n]*$",
        ];
        let cleanup_legacy = [
            r"(?ms)^[ \t]*---FILE:[^\n]*---.*?^[ \t]*---END FILE:[^\n]*---[^\n]*",
            r"(?ms)^[ \t]*---FILE:[^\n]*---[ \t]*$.*",
        ];
        let cleanup_metadata = [
            r"(?m)^[ \t]*#{1,6}\s*(?:FILE|File|文件)\s*[:：][^\n]*$",
            r"(?m)^[ \t]*(?:\*\*)?(?:REASON|Reason|原因|理由)(?:\*\*)?\s*[:：][^\n]*$",
            r"(?m)^\*\*(?:Reason|REASON) for [^\n]*$",
            r"(?m)^(?:Reason|REASON) for [^\n]*[:：][^\n]*$",
            r"(?m)^[^\n]*(?:修改原因|的原因)(?:\*\*)?\s*[:：][^\n]*$",
            r"(?m)^[ \t]*```[\w+-]*[ \t]*\r?\n[ \t]*```[ \t]*$",
        ];

        Ok(Self {
            file_header: Regex::new(r"^#{1,6}\s*(?:FILE|File|文件)\s*[:：]\s*(.+?)\s*$")?,
            reason_line: Regex::new(
                r"^(?:\*\*)?(?:REASON|Reason|原因|理由)(?:\*\*)?\s*[:：]\s*(?:\*\*)?\s*(.+?)\s*$",
            )?,
            line_hint: Regex::new(r"(?i)line\s*:?\s*(\d+)")?,
            legacy_block: Regex::new(
                r"(?s)---FILE:\s*([^\n]+?)\s*---[ \t]*\r?\n(.*?)\r?\n?---END FILE:\s*([^\n]+?)\s*---",
            )?,
            legacy_start: Regex::new(r"---FILE:\s*([^\n]+?)\s*---[ \t]*\r?\n")?,
            reasons: compile_all(&reasons)?,
            cleanup_patch: compile_all(&cleanup_patch)?,
            cleanup_legacy: compile_all(&cleanup_legacy)?,
            cleanup_metadata: compile_all(&cleanup_metadata)?,
            blank_runs: Regex::new(r"(?:[ \t]*\r?\n){3,}")?,
        })
    }
}

fn compile_all(sources: &[&str]) -> Result<Vec<Regex>, regex::Error> {
    sources.iter().map(|p| Regex::new(p)).collect()
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| match Patterns::compile() {
            Ok(patterns) => Some(patterns),
            Err(e) => {
                warn!("Failed to compile response patterns: {}", e);
                None
            }
        })
        .as_ref()
}

/// Path as written by a model, reduced for comparison.
fn normalize_path(path: &str) -> String {
    path.trim()
        .trim_matches(|c| matches!(c, '`' | '"' | '\'' | '*'))
        .replace('\\', "/")
        .trim_start_matches("./")
        .to_lowercase()
}

fn clean_path(path: &str) -> String {
    path.trim()
        .trim_matches(|c| matches!(c, '`' | '"' | '\'' | '*'))
        .trim()
        .to_string()
}

/// Path of a `### FILE: path` header line.
pub(super) fn file_header(line: &str) -> Option<String> {
    let caps = patterns()?.file_header.captures(line)?;
    let path = clean_path(caps.get(1)?.as_str());
    (!path.is_empty()).then_some(path)
}

fn reason_line(line: &str) -> Option<String> {
    let caps = patterns()?.reason_line.captures(line)?;
    let reason = caps.get(1)?.as_str().trim_end_matches("**").trim();
    (!reason.is_empty()).then(|| reason.to_string())
}

fn join_lines(lines: &[&str]) -> String {
    if lines.is_empty() {
        String::new()
    } else {
        let mut text = lines.join("\n");
        text.push('\n');
        text
    }
}

/// Whether the response uses the search/replace dialect.
pub fn is_patch_format(response: &str) -> bool {
    response.contains(SEARCH_MARKER) || response.contains(NEW_FILE_START)
}

/// Extract the proposed edits and the explanation from a model response.
///
/// `original_files` maps paths to the content the edit was requested
/// against; in the legacy dialect a path missing from it is a new file.
pub fn parse_edit_response(response: &str, original_files: &HashMap<String, String>) -> ParseResult {
    let used_patch_format = is_patch_format(response);
    let mut changed_files = if used_patch_format {
        extract_patch_files(response)
    } else {
        extract_legacy_files(response)
    };

    let reason_spans = attach_reasons(response, &mut changed_files);

    for file in &mut changed_files {
        let original = lookup(original_files, &file.path);
        if !used_patch_format {
            file.is_new_file = original.is_none();
        }
        file.original_content = original.cloned();
    }

    debug!(
        "Parsed {} changed files ({} dialect)",
        changed_files.len(),
        if used_patch_format { "patch" } else { "legacy" }
    );

    let message = build_message(response, &changed_files, reason_spans, used_patch_format);
    ParseResult {
        changed_files,
        message,
        raw: response.to_string(),
        used_patch_format,
    }
}

fn lookup<'a>(files: &'a HashMap<String, String>, path: &str) -> Option<&'a String> {
    files.get(path).or_else(|| {
        let wanted = normalize_path(path);
        files
            .iter()
            .find(|(candidate, _)| normalize_path(candidate) == wanted)
            .map(|(_, content)| content)
    })
}

fn file_slot(files: &mut Vec<ParsedFile>, path: String) -> usize {
    let wanted = normalize_path(&path);
    match files.iter().position(|f| normalize_path(&f.path) == wanted) {
        Some(index) => index,
        None => {
            files.push(ParsedFile {
                path,
                ..Default::default()
            });
            files.len() - 1
        }
    }
}

enum Scan<T> {
    Complete { value: T, next: usize },
    /// Incomplete block; scanning resumes at `resume`
    Malformed { resume: usize },
}

fn opens_section(line: &str) -> bool {
    line.starts_with(SEARCH_MARKER) || line.starts_with(NEW_FILE_START) || file_header(line).is_some()
}

fn scan_search_block(lines: &[&str], start: usize) -> Scan<SearchReplaceBlock> {
    let marker = lines[start].trim();
    let line_number = patterns()
        .and_then(|p| p.line_hint.captures(&marker[SEARCH_MARKER.len()..]))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok());

    let mut search = Vec::new();
    let mut j = start + 1;
    loop {
        let Some(line) = lines.get(j) else {
            return Scan::Malformed { resume: j };
        };
        let trimmed = line.trim();
        if trimmed == SEPARATOR {
            break;
        }
        if opens_section(trimmed) || trimmed.starts_with(REPLACE_MARKER) {
            return Scan::Malformed { resume: j };
        }
        search.push(*line);
        j += 1;
    }

    let mut replace = Vec::new();
    j += 1;
    loop {
        let Some(line) = lines.get(j) else {
            return Scan::Malformed { resume: j };
        };
        let trimmed = line.trim();
        if trimmed.starts_with(REPLACE_MARKER) {
            break;
        }
        if opens_section(trimmed) || trimmed == SEPARATOR {
            return Scan::Malformed { resume: j };
        }
        replace.push(*line);
        j += 1;
    }

    Scan::Complete {
        value: SearchReplaceBlock {
            search: join_lines(&search),
            replace: join_lines(&replace),
            line_number,
        },
        next: j + 1,
    }
}

fn scan_new_file(lines: &[&str], start: usize) -> Scan<String> {
    let mut content = Vec::new();
    let mut j = start + 1;
    loop {
        let Some(line) = lines.get(j) else {
            return Scan::Malformed { resume: j };
        };
        let trimmed = line.trim();
        if trimmed.starts_with(NEW_FILE_END) {
            break;
        }
        if opens_section(trimmed) {
            return Scan::Malformed { resume: j };
        }
        content.push(*line);
        j += 1;
    }
    Scan::Complete {
        value: join_lines(&content),
        next: j + 1,
    }
}

fn extract_patch_files(response: &str) -> Vec<ParsedFile> {
    let lines: Vec<&str> = response.lines().collect();
    let mut files: Vec<ParsedFile> = Vec::new();
    let mut current: Option<usize> = None;
    let mut i = 0;

    while i < lines.len() {
        let trimmed = lines[i].trim();

        if let Some(path) = file_header(trimmed) {
            current = Some(file_slot(&mut files, path));
            i += 1;
            continue;
        }

        if trimmed.starts_with(SEARCH_MARKER) {
            match scan_search_block(&lines, i) {
                Scan::Complete { value, next } => {
                    match current {
                        Some(index) => files[index].blocks.push(value),
                        None => debug!("Skipping SEARCH block outside a file section"),
                    }
                    i = next;
                }
                Scan::Malformed { resume } => {
                    debug!("Skipping incomplete SEARCH block at line {}", i + 1);
                    i = resume;
                }
            }
            continue;
        }

        if trimmed.starts_with(NEW_FILE_START) {
            match scan_new_file(&lines, i) {
                Scan::Complete { value, next } => {
                    if let Some(index) = current {
                        files[index].full_content = Some(value);
                        files[index].is_new_file = true;
                    }
                    i = next;
                }
                Scan::Malformed { resume } => {
                    debug!("Skipping unclosed NEW_FILE block at line {}", i + 1);
                    i = resume;
                }
            }
            continue;
        }

        if let (Some(index), Some(reason)) = (current, reason_line(trimmed)) {
            files[index].reason.get_or_insert(reason);
        }
        i += 1;
    }

    files.retain(|f| !f.blocks.is_empty() || f.full_content.is_some());
    files
}

type LegacyExtractor = fn(&Patterns, &str) -> Vec<(String, String)>;

/// Legacy extractors, loosest last. The first non-empty result wins.
const LEGACY_EXTRACTORS: [(&str, LegacyExtractor); 3] = [
    ("strict", extract_legacy_strict),
    ("normalized", extract_legacy_normalized),
    ("unclosed", extract_legacy_unclosed),
];

fn legacy_pairs(p: &Patterns, response: &str, same: fn(&str, &str) -> bool) -> Vec<(String, String)> {
    p.legacy_block
        .captures_iter(response)
        .filter_map(|caps| {
            let start = caps.get(1)?.as_str();
            let body = caps.get(2)?.as_str();
            let end = caps.get(3)?.as_str();
            same(start, end).then(|| (clean_path(start), body.to_string()))
        })
        .collect()
}

fn extract_legacy_strict(p: &Patterns, response: &str) -> Vec<(String, String)> {
    legacy_pairs(p, response, |a, b| a.trim() == b.trim())
}

fn extract_legacy_normalized(p: &Patterns, response: &str) -> Vec<(String, String)> {
    legacy_pairs(p, response, |a, b| normalize_path(a) == normalize_path(b))
}

fn extract_legacy_unclosed(p: &Patterns, response: &str) -> Vec<(String, String)> {
    let starts: Vec<_> = p
        .legacy_start
        .captures_iter(response)
        .filter_map(|caps| Some((caps.get(0)?, caps.get(1)?.as_str())))
        .collect();

    starts
        .iter()
        .enumerate()
        .map(|(index, (marker, path))| {
            let until = starts
                .get(index + 1)
                .map_or(response.len(), |(next, _)| next.start());
            let mut body = &response[marker.end()..until];
            if let Some(end) = body.find(LEGACY_END) {
                body = &body[..end];
            }
            (clean_path(path), body.trim_end().to_string())
        })
        .collect()
}

/// Drop a code fence wrapped around a whole file body.
fn strip_code_fence(body: &str) -> &str {
    let trimmed = body.trim();
    if !trimmed.starts_with("```") || !trimmed.ends_with("```") || trimmed.len() < 6 {
        return body;
    }
    match trimmed.find('\n') {
        Some(first_newline) => trimmed[first_newline + 1..trimmed.len() - 3].trim_end_matches([' ', '\t']),
        None => body,
    }
}

fn extract_legacy_files(response: &str) -> Vec<ParsedFile> {
    let Some(p) = patterns() else {
        return Vec::new();
    };

    for (name, extract) in LEGACY_EXTRACTORS {
        let pairs = extract(p, response);
        if pairs.is_empty() {
            continue;
        }
        debug!("Legacy blocks found by {} extractor", name);

        let mut files: Vec<ParsedFile> = Vec::new();
        for (path, body) in pairs {
            if path.is_empty() {
                continue;
            }
            let mut content = strip_code_fence(&body).to_string();
            if !content.is_empty() && !content.ends_with('\n') {
                content.push('\n');
            }
            let index = file_slot(&mut files, path);
            files[index].full_content = Some(content);
        }
        return files;
    }
    Vec::new()
}

/// Fill in missing reasons. The first reason found for a path is kept.
///
/// Returns the byte ranges of every reason line naming a changed file, so
/// they can be cut from the explanation.
fn attach_reasons(response: &str, files: &mut [ParsedFile]) -> Vec<Range<usize>> {
    let Some(p) = patterns() else {
        return Vec::new();
    };
    let mut consumed = Vec::new();
    for pattern in &p.reasons {
        for caps in pattern.captures_iter(response) {
            let (Some(whole), Some(path), Some(reason)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            let wanted = normalize_path(path.as_str());
            let reason = reason.as_str().trim().trim_end_matches("**").trim();
            if reason.is_empty() {
                continue;
            }
            let Some(file) = files
                .iter_mut()
                .find(|f| normalize_path(&f.path) == wanted)
            else {
                continue;
            };
            if file.reason.is_none() {
                file.reason = Some(reason.to_string());
            }
            consumed.push(whole.range());
        }
    }
    consumed
}

/// `text` without `spans`, which may overlap.
fn cut_spans(text: &str, mut spans: Vec<Range<usize>>) -> String {
    spans.sort_by_key(|r| r.start);
    let mut kept = String::with_capacity(text.len());
    let mut cursor = 0;
    for span in spans {
        if span.start > cursor {
            kept.push_str(&text[cursor..span.start]);
        }
        cursor = cursor.max(span.end);
    }
    kept.push_str(&text[cursor.min(text.len())..]);
    kept
}

fn build_message(
    response: &str,
    files: &[ParsedFile],
    reason_spans: Vec<Range<usize>>,
    used_patch_format: bool,
) -> String {
    let Some(p) = patterns() else {
        return diagnostic_message(response);
    };

    let structure = if used_patch_format {
        &p.cleanup_patch
    } else {
        &p.cleanup_legacy
    };
    let mut text = cut_spans(response, reason_spans);
    for pattern in structure.iter().chain(&p.cleanup_metadata) {
        text = pattern.replace_all(&text, "").into_owned();
    }
    let message = p.blank_runs.replace_all(&text, "\n\n").trim().to_string();

    if files.is_empty() && message.chars().count() < MIN_MESSAGE_CHARS {
        return diagnostic_message(response);
    }
    if message.is_empty() {
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        return format!(
            "Proposed changes to {} file(s): {}",
            files.len(),
            paths.join(", ")
        );
    }
    message
}

/// Message shown when nothing could be extracted. The raw response is
/// embedded in a fence, so fences inside it are broken up.
fn diagnostic_message(response: &str) -> String {
    let escaped = response.replace("```", "`\u{200B}`\u{200B}`");
    format!(
        "Could not find any file changes or explanation in the response.\n\nRaw response:\n```\n{}\n```",
        escaped
    )
}

//! Patch data model.
//!
//! These types cross the boundary to whatever presents the edits (the
//! `apply` command, an editor integration), so they serialize in camelCase.

use serde::{Deserialize, Serialize};

/// One localized edit. An empty `search` with a `line_number` is a pure
/// insertion before that (1-based) line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchReplaceBlock {
    pub search: String,
    pub replace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<usize>,
}

impl SearchReplaceBlock {
    pub fn new(search: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            search: search.into(),
            replace: replace.into(),
            line_number: None,
        }
    }

    /// First non-blank line of the search text, for messages.
    pub fn preview(&self) -> &str {
        self.search
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or("")
    }
}

/// Proposed changes to one file. When `full_content` is set the blocks are
/// ignored and the file becomes that content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchBlock {
    pub file_path: String,
    #[serde(default)]
    pub blocks: Vec<SearchReplaceBlock>,
    #[serde(default)]
    pub is_new_file: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Outcome of applying one [`PatchBlock`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchResult {
    pub success: bool,
    pub file_path: String,
    pub original_content: String,
    pub patched_content: String,
    pub applied_blocks: usize,
    pub failed_blocks: Vec<SearchReplaceBlock>,
    pub errors: Vec<String>,
    #[serde(default)]
    pub is_new_file: bool,
}

/// Outcome of applying a single block to a buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockApplyResult {
    pub success: bool,
    /// Updated buffer, or the input unchanged on failure
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Byte offset just past the inserted replacement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_end: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<MatchStrategy>,
}

impl BlockApplyResult {
    pub(crate) fn failed(content: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            content: content.to_string(),
            error: Some(error.into()),
            match_end: None,
            strategy: None,
        }
    }
}

/// Outcome of applying several blocks to one buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiBlockResult {
    /// True only when every block applied
    pub success: bool,
    pub content: String,
    pub applied_count: usize,
    pub failed_blocks: Vec<SearchReplaceBlock>,
    pub errors: Vec<String>,
}

/// Matching strategies, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    Exact,
    WhitespaceNormalized,
    FuzzyLines,
    Contextual,
}

impl MatchStrategy {
    pub const CASCADE: [MatchStrategy; 4] = [
        MatchStrategy::Exact,
        MatchStrategy::WhitespaceNormalized,
        MatchStrategy::FuzzyLines,
        MatchStrategy::Contextual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::Exact => "exact",
            MatchStrategy::WhitespaceNormalized => "whitespace-normalized",
            MatchStrategy::FuzzyLines => "fuzzy",
            MatchStrategy::Contextual => "contextual",
        }
    }
}

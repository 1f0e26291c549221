//! Search/replace matcher.
//!
//! A block is located with the first strategy of [`MatchStrategy::CASCADE`]
//! that succeeds:
//!
//! 1. exact substring match
//! 2. match with trailing whitespace stripped per line, mapped back to
//!    original offsets and checked by line similarity
//! 3. sliding line window anchored on the first search line, scored by
//!    exact (1.0) and partial (0.7) line matches
//! 4. a single distinctive line of the search text, replaced on its own
//!
//! Search and replace text are converted to the buffer's line endings first.
//! Failures are reported in the result, never as errors.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::{BlockApplyResult, MatchStrategy, MultiBlockResult, SearchReplaceBlock};

pub const NORMALIZED_SIMILARITY: f64 = 0.9;
pub const FUZZY_CONFIDENCE: f64 = 0.6;
pub const CONTEXTUAL_MIN_LINE_LEN: usize = 10;

const EXACT_LINE_SCORE: f64 = 1.0;
const PARTIAL_LINE_SCORE: f64 = 0.7;

/// Thresholds of the fuzzy strategies. All scores are in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MatcherTuning {
    /// Minimum line similarity accepted by the whitespace-normalized match
    pub normalized_similarity: f64,
    /// Minimum window score of the fuzzy match (and length ratio of a
    /// partial contextual match)
    pub fuzzy_confidence: f64,
    /// Lines this short never anchor a contextual match
    pub contextual_min_line_len: usize,
}

impl Default for MatcherTuning {
    fn default() -> Self {
        Self {
            normalized_similarity: NORMALIZED_SIMILARITY,
            fuzzy_confidence: FUZZY_CONFIDENCE,
            contextual_min_line_len: CONTEXTUAL_MIN_LINE_LEN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    start: usize,
    end: usize,
}

/// A line of a buffer with its byte offsets.
struct Line<'a> {
    /// Text without the line terminator
    text: &'a str,
    start: usize,
    /// End of `text`
    end: usize,
    /// Start of the following line
    next: usize,
}

fn split_lines(content: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for piece in content.split_inclusive('\n') {
        let next = start + piece.len();
        let body = piece.strip_suffix('\n').unwrap_or(piece);
        let body = body.strip_suffix('\r').unwrap_or(body);
        lines.push(Line {
            text: body,
            start,
            end: start + body.len(),
            next,
        });
        start = next;
    }
    lines
}

/// Search lines without leading and trailing blank lines.
fn significant_lines(text: &str) -> Vec<&str> {
    let lines: Vec<&str> = text.lines().collect();
    let first = lines.iter().position(|l| !l.trim().is_empty());
    let last = lines.iter().rposition(|l| !l.trim().is_empty());
    match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].to_vec(),
        _ => Vec::new(),
    }
}

fn uses_crlf(content: &str) -> bool {
    content.contains("\r\n")
}

fn to_line_endings(text: &str, crlf: bool) -> String {
    let lf = text.replace("\r\n", "\n");
    if crlf {
        lf.replace('\n', "\r\n")
    } else {
        lf
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Score of one content line against one search line.
fn line_score(content_line: &str, search_line: &str) -> f64 {
    let a = content_line.trim();
    let b = search_line.trim();
    if a == b {
        EXACT_LINE_SCORE
    } else if !a.is_empty() && !b.is_empty() && (a.contains(b) || b.contains(a)) {
        PARTIAL_LINE_SCORE
    } else {
        0.0
    }
}

/// Fraction of lines equal up to trailing whitespace.
fn line_similarity(a: &str, b: &str) -> f64 {
    let a = significant_lines(a);
    let b = significant_lines(b);
    let total = a.len().max(b.len());
    if total == 0 {
        return 1.0;
    }
    let equal = a
        .iter()
        .zip(&b)
        .filter(|(x, y)| x.trim_end() == y.trim_end())
        .count();
    equal as f64 / total as f64
}

fn is_comment(line: &str) -> bool {
    const PREFIXES: [&str; 8] = ["//", "/*", "*/", "* ", "# ", "--", "<!--", ";;"];
    line == "*" || PREFIXES.iter().any(|p| line.starts_with(p))
}

fn splice(content: &str, span: Span, replacement: &str, strategy: MatchStrategy) -> BlockApplyResult {
    let mut patched =
        String::with_capacity(content.len() - (span.end - span.start) + replacement.len());
    patched.push_str(&content[..span.start]);
    patched.push_str(replacement);
    patched.push_str(&content[span.end..]);
    BlockApplyResult {
        success: true,
        content: patched,
        error: None,
        match_end: Some(span.start + replacement.len()),
        strategy: Some(strategy),
    }
}

/// Insert `text` before 1-based `line_number`, or append past the last line.
fn insert_at_line(content: &str, text: &str, line_number: usize, crlf: bool) -> BlockApplyResult {
    let eol = if crlf { "\r\n" } else { "\n" };
    let lines = split_lines(content);
    let index = line_number.saturating_sub(1);
    let mut inserted = text.to_string();

    let offset = match lines.get(index) {
        Some(line) => {
            if !inserted.ends_with('\n') {
                inserted.push_str(eol);
            }
            line.start
        }
        None => {
            if !content.is_empty() && !content.ends_with('\n') {
                inserted.insert_str(0, eol);
            }
            content.len()
        }
    };

    let mut patched = String::with_capacity(content.len() + inserted.len());
    patched.push_str(&content[..offset]);
    patched.push_str(&inserted);
    patched.push_str(&content[offset..]);
    BlockApplyResult {
        success: true,
        content: patched,
        error: None,
        match_end: Some(offset + inserted.len()),
        strategy: None,
    }
}

/// Applies search/replace blocks with a fixed [`MatcherTuning`].
#[derive(Debug, Clone, Default)]
pub struct Matcher {
    tuning: MatcherTuning,
}

impl Matcher {
    pub fn new(tuning: MatcherTuning) -> Self {
        Self { tuning }
    }

    pub fn tuning(&self) -> &MatcherTuning {
        &self.tuning
    }

    /// Apply one block, matching at or after byte offset `start_from`.
    pub fn apply(&self, content: &str, block: &SearchReplaceBlock, start_from: usize) -> BlockApplyResult {
        let crlf = uses_crlf(content);
        let search = to_line_endings(&block.search, crlf);
        let replace = to_line_endings(&block.replace, crlf);

        if search.trim().is_empty() {
            return match block.line_number {
                Some(line) => insert_at_line(content, &replace, line, crlf),
                None => BlockApplyResult::failed(
                    content,
                    "Search text is empty and no line number was given for an insertion",
                ),
            };
        }

        let start_from = floor_char_boundary(content, start_from);
        for strategy in MatchStrategy::CASCADE {
            let Some(span) = self.find(strategy, content, &search, start_from) else {
                continue;
            };
            debug!(
                "Block matched ({}) at {}..{}",
                strategy.as_str(),
                span.start,
                span.end
            );
            let replacement = match strategy {
                // Only the one line is replaced; its terminator stays
                MatchStrategy::Contextual => replace
                    .strip_suffix('\n')
                    .map(|r| r.strip_suffix('\r').unwrap_or(r))
                    .unwrap_or(replace.as_str()),
                _ => replace.as_str(),
            };
            return splice(content, span, replacement, strategy);
        }

        BlockApplyResult::failed(
            content,
            format!(
                "Could not find a match for search text starting with \"{}\"",
                block.preview()
            ),
        )
    }

    /// Apply blocks in order. A failed block is recorded and skipped.
    ///
    /// Each block is searched after the previous match first and, failing
    /// that, from the top of the buffer.
    pub fn apply_all(&self, content: &str, blocks: &[SearchReplaceBlock]) -> MultiBlockResult {
        let mut current = content.to_string();
        let mut position = 0;
        let mut applied_count = 0;
        let mut failed_blocks = Vec::new();
        let mut errors = Vec::new();

        for (index, block) in blocks.iter().enumerate() {
            let mut result = self.apply(&current, block, position);
            if !result.success && position > 0 {
                let retry = self.apply(&current, block, 0);
                if retry.success {
                    debug!("Block {} matched before the previous block", index + 1);
                    result = retry;
                }
            }

            if result.success {
                position = result.match_end.unwrap_or(0);
                current = result.content;
                applied_count += 1;
            } else {
                errors.push(format!(
                    "Block {}: {}",
                    index + 1,
                    result.error.unwrap_or_else(|| "not applied".to_string())
                ));
                failed_blocks.push(block.clone());
            }
        }

        MultiBlockResult {
            success: failed_blocks.is_empty(),
            content: current,
            applied_count,
            failed_blocks,
            errors,
        }
    }

    fn find(&self, strategy: MatchStrategy, content: &str, search: &str, start_from: usize) -> Option<Span> {
        match strategy {
            MatchStrategy::Exact => find_exact(content, search, start_from),
            MatchStrategy::WhitespaceNormalized => self.find_normalized(content, search, start_from),
            MatchStrategy::FuzzyLines => self.find_fuzzy(content, search, start_from),
            MatchStrategy::Contextual => self.find_contextual(content, search, start_from),
        }
    }

    fn find_normalized(&self, content: &str, search: &str, start_from: usize) -> Option<Span> {
        let lines = split_lines(content);
        let mut normalized = String::with_capacity(content.len());
        let mut starts = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            if i > 0 {
                normalized.push('\n');
            }
            starts.push(normalized.len());
            normalized.push_str(line.text.trim_end());
        }

        let needle = split_lines(search)
            .iter()
            .map(|l| l.text.trim_end())
            .collect::<Vec<_>>()
            .join("\n");
        if needle.is_empty() {
            return None;
        }

        let first_line = lines.iter().position(|l| l.start >= start_from)?;
        let from = starts[first_line];
        let found = from + normalized[from..].find(&needle)?;

        // Normalized lines are prefixes of the originals, so columns carry over
        let map = |offset: usize| {
            let i = match starts.binary_search(&offset) {
                Ok(i) => i,
                Err(i) => i - 1,
            };
            (i, lines[i].start + (offset - starts[i]))
        };
        let (_, start) = map(found);
        let (last, mut end) = map(found + needle.len());
        let line = &lines[last];
        if search.ends_with('\n') && end >= line.start + line.text.trim_end().len() {
            end = line.next;
        }

        let similarity = line_similarity(&content[start..end], search);
        if similarity > self.tuning.normalized_similarity {
            Some(Span { start, end })
        } else {
            debug!("Normalized match rejected, similarity {:.2}", similarity);
            None
        }
    }

    fn find_fuzzy(&self, content: &str, search: &str, start_from: usize) -> Option<Span> {
        let needle = significant_lines(search);
        if needle.is_empty() {
            return None;
        }
        let lines = split_lines(content);
        let anchor = needle[0].trim();

        let mut best: Option<(f64, usize)> = None;
        for i in 0..lines.len() {
            if i + needle.len() > lines.len() {
                break;
            }
            if lines[i].start < start_from {
                continue;
            }
            let candidate = lines[i].text.trim();
            let anchored = anchor.is_empty()
                || (!candidate.is_empty() && (candidate.contains(anchor) || anchor.contains(candidate)));
            if !anchored {
                continue;
            }
            let total: f64 = lines[i..i + needle.len()]
                .iter()
                .zip(&needle)
                .map(|(line, search_line)| line_score(line.text, search_line))
                .sum();
            let score = total / needle.len() as f64;
            if best.map_or(true, |(s, _)| score > s) {
                best = Some((score, i));
            }
        }

        let (score, first) = best?;
        if score <= self.tuning.fuzzy_confidence {
            debug!("Best fuzzy window scored {:.2}, below threshold", score);
            return None;
        }
        let last = &lines[first + needle.len() - 1];
        let end = if search.ends_with('\n') { last.next } else { last.end };
        Some(Span {
            start: lines[first].start,
            end,
        })
    }

    fn find_contextual(&self, content: &str, search: &str, start_from: usize) -> Option<Span> {
        let mut key: Option<&str> = None;
        for line in search.lines().map(str::trim) {
            if line.chars().count() <= self.tuning.contextual_min_line_len || is_comment(line) {
                continue;
            }
            if key.map_or(true, |k| line.len() > k.len()) {
                key = Some(line);
            }
        }
        let key = key?;

        let lines = split_lines(content);
        let candidates = lines.iter().enumerate().filter(|(_, l)| l.start >= start_from);

        let mut chosen = None;
        let mut best_ratio = 0.0;
        for (index, line) in candidates {
            let text = line.text.trim();
            if text == key {
                chosen = Some(index);
                break;
            }
            if text.is_empty() || !(text.contains(key) || key.contains(text)) {
                continue;
            }
            let ratio = text.len().min(key.len()) as f64 / text.len().max(key.len()) as f64;
            if ratio > self.tuning.fuzzy_confidence && ratio > best_ratio {
                best_ratio = ratio;
                chosen = Some(index);
            }
        }

        let index = chosen?;
        warn!(
            "Applied edit by contextual match on line {} (\"{}\"); review the result",
            index + 1,
            key
        );
        Some(Span {
            start: lines[index].start,
            end: lines[index].end,
        })
    }
}

fn find_exact(content: &str, search: &str, start_from: usize) -> Option<Span> {
    let offset = content.get(start_from..)?.find(search)?;
    let start = start_from + offset;
    Some(Span {
        start,
        end: start + search.len(),
    })
}

/// Apply one block with the default tuning.
pub fn apply_search_replace_block(
    content: &str,
    block: &SearchReplaceBlock,
    start_from: usize,
) -> BlockApplyResult {
    Matcher::default().apply(content, block, start_from)
}

/// Apply several blocks with the default tuning.
pub fn apply_multiple_blocks(content: &str, blocks: &[SearchReplaceBlock]) -> MultiBlockResult {
    Matcher::default().apply_all(content, blocks)
}

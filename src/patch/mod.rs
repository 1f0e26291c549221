//! Patch engine for model-proposed edits.
//!
//! Parses a model response into per-file edits and applies them to
//! caller-supplied buffers. Everything here is pure: no I/O and no shared
//! state, so files can be processed independently.

mod apply;
mod matcher;
mod parser;
mod types;
mod validate;

pub use apply::{apply_multiple_patches, apply_patch_block};
pub use matcher::{apply_multiple_blocks, apply_search_replace_block, Matcher, MatcherTuning};
pub use parser::{is_patch_format, parse_edit_response, ParseResult, ParsedFile};
pub use types::{
    BlockApplyResult, MatchStrategy, MultiBlockResult, PatchBlock, PatchResult, SearchReplaceBlock,
};
pub use validate::{validate_response, ValidationResult};

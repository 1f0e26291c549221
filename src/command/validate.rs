use anyhow::{bail, Result};
use std::collections::HashMap;
use std::path::PathBuf;

use super::apply::read_response;
use crate::patch::{parse_edit_response, validate_response};

pub async fn run_validate(response_path: Option<PathBuf>) -> Result<()> {
    let response = read_response(response_path.as_deref())?;

    let validation = validate_response(&response);
    let parsed = parse_edit_response(&response, &HashMap::new());

    let dialect = if parsed.used_patch_format {
        "search/replace"
    } else {
        "whole-file"
    };
    println!(
        "Found edits for {} file(s) ({} format)",
        parsed.changed_files.len(),
        dialect
    );
    for file in &parsed.changed_files {
        let detail = match (&file.full_content, file.blocks.len()) {
            (Some(_), 0) => "full content".to_string(),
            (_, n) => format!("{} block(s)", n),
        };
        println!("   {}: {}", file.path, detail);
    }

    for warning in &validation.warnings {
        println!("⚠️  {}", warning);
    }
    for error in &validation.errors {
        println!("❌ {}", error);
    }

    if !validation.is_valid {
        bail!("Response has {} structural error(s)", validation.errors.len());
    }
    println!("✅ Response is well-formed");
    Ok(())
}

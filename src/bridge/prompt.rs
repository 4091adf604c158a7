//! Prompt construction and model output cleanup for the CLI bridge.

use regex::Regex;

use crate::error::{AppError, ErrorCode};

// --- Prompt construction ---

/// Build the instruction block sent to the translator CLI on stdin.
pub fn build_translation_prompt(text: &str, source_lang: &str, target_lang: &str) -> String {
    let source_guide = if source_lang == "auto" {
        "Detect the source language automatically.".to_string()
    } else {
        format!("Source language is {source_lang}.")
    };
    format!(
        "You are a professional translator.\n\
         {source_guide}\n\
         Translate the user text into {target_lang}.\n\
         Keep meaning and tone.\n\
         Do not add explanations.\n\
         Return only translated text.\n\
         Text:\n\
         \"\"\"\n\
         {text}\n\
         \"\"\""
    )
}

// --- Output cleanup ---

/// Normalize raw model output into the final translation.
///
/// Strips a single wrapping markdown fence or one matching pair of
/// surrounding quotes, then trims. Output that is empty after cleanup is an
/// error; a blank translation is never returned to callers.
pub fn sanitize_translation(raw: &str) -> Result<String, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(empty_output());
    }
    let fence = Regex::new(r"(?s)^```\w*\n(.*?)\n```$").unwrap();
    let inner = match fence.captures(trimmed) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(""),
        None => strip_wrapping_quotes(trimmed),
    };
    let cleaned = inner.trim();
    if cleaned.is_empty() {
        return Err(empty_output());
    }
    Ok(cleaned.to_string())
}

/// Collapse all whitespace runs to single spaces and trim the ends.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_wrapping_quotes(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2
        && bytes[0] == bytes[bytes.len() - 1]
        && (bytes[0] == b'"' || bytes[0] == b'\'')
    {
        &text[1..text.len() - 1]
    } else {
        text
    }
}

fn empty_output() -> AppError {
    AppError::new(ErrorCode::EmptyOutput, "Model returned an empty translation.")
}

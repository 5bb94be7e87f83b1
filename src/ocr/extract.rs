//! Text normalization shared by both backends, plus cloud text extraction.
//!
//! Cloud replies come in several shapes depending on which chat-completions
//! flavour answered. Each shape is handled by one strategy function and the
//! strategies are tried in a fixed order; the first non-blank text wins.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use super::error::truncate_chars;

/// Most text items returned per call.
pub const MAX_TEXT_ITEMS: usize = 500;

/// Longest single text item, in characters.
pub const MAX_TEXT_LENGTH: usize = 2000;

static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think>.*?</think>").unwrap());

static REASONING_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<reasoning>.*?</reasoning>").unwrap());

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_+-]*[ \t]*\n(.*?)\n?```$").unwrap());

/// One recognized line of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedText {
    pub text: String,
}

impl ExtractedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Trim and bound a candidate text value. Non-strings and blanks yield `None`.
pub fn normalize_extracted_text(value: &Value) -> Option<String> {
    normalize_text(value.as_str()?)
}

pub(crate) fn normalize_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(truncate_chars(trimmed, MAX_TEXT_LENGTH))
}

type TextStrategy = fn(&Value) -> Option<String>;

const CLOUD_TEXT_STRATEGIES: [TextStrategy; 4] = [
    output_text_field,
    result_field,
    output_blocks,
    first_choice,
];

/// Pull the answer text out of a cloud response body.
pub fn extract_cloud_text(data: &Value) -> Option<String> {
    CLOUD_TEXT_STRATEGIES
        .iter()
        .find_map(|strategy| strategy(data).filter(|text| !text.trim().is_empty()))
}

fn output_text_field(data: &Value) -> Option<String> {
    data.get("output_text")?.as_str().map(str::to_string)
}

fn result_field(data: &Value) -> Option<String> {
    data.get("result")?.as_str().map(str::to_string)
}

/// Responses-API style `output` array.
fn output_blocks(data: &Value) -> Option<String> {
    let blocks = data.get("output")?.as_array()?;
    let parts: Vec<String> = blocks
        .iter()
        .filter_map(|block| {
            if block.get("type").and_then(Value::as_str) == Some("message") {
                block.get("content").map(extract_message_content)
            } else {
                block.get("text").and_then(Value::as_str).map(str::to_string)
            }
        })
        .filter(|part| !part.is_empty())
        .collect();
    Some(parts.join("\n"))
}

/// Chat-completions style `choices[0]`.
fn first_choice(data: &Value) -> Option<String> {
    let choice = data.get("choices")?.as_array()?.first()?;

    if let Some(message) = choice.get("message").filter(|m| m.is_object()) {
        let content = message
            .get("content")
            .map(extract_message_content)
            .unwrap_or_default();
        if !content.trim().is_empty() {
            return Some(content);
        }
        return message.get("text").and_then(Value::as_str).map(str::to_string);
    }

    choice.get("text").and_then(Value::as_str).map(str::to_string)
}

/// Flatten message content (string, part array, or part object) into text.
pub fn extract_message_content(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .map(content_part_text)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(_) => {
            if let Some(text) = content.get("text").and_then(Value::as_str) {
                return text.to_string();
            }
            match content.get("content") {
                Some(nested @ Value::Array(_)) => extract_message_content(nested),
                _ => String::new(),
            }
        }
        _ => String::new(),
    }
}

fn content_part_text(part: &Value) -> String {
    match part {
        Value::String(text) => text.clone(),
        Value::Object(_) => {
            for key in ["text", "output_text", "content"] {
                if let Some(text) = part.get(key).and_then(Value::as_str) {
                    return text.to_string();
                }
            }
            match part.get("content") {
                Some(nested @ Value::Array(_)) => extract_message_content(nested),
                _ => String::new(),
            }
        }
        _ => String::new(),
    }
}

/// Strip model chatter around the recognized text.
///
/// Removes `<think>`/`<reasoning>` blocks and a wrapping code fence, repeating
/// until nothing changes, so applying it twice gives the same result.
pub fn cleanup_cloud_text(text: &str) -> String {
    let mut current = text.replace("\r\n", "\n").replace('\r', "\n");
    loop {
        let next = cleanup_pass(&current);
        if next == current {
            return next;
        }
        current = next;
    }
}

fn cleanup_pass(text: &str) -> String {
    let without_think = THINK_BLOCK.replace_all(text.trim(), "");
    let without_reasoning = REASONING_BLOCK.replace_all(&without_think, "");
    let trimmed = without_reasoning.trim();

    match CODE_FENCE.captures(trimmed) {
        Some(captures) => captures
            .get(1)
            .map(|inner| inner.as_str().trim().to_string())
            .unwrap_or_default(),
        None => trimmed.to_string(),
    }
}

/// Split cleaned cloud text into bounded lines.
pub fn split_cloud_lines(cleaned: &str) -> Vec<ExtractedText> {
    let lines: Vec<ExtractedText> = cleaned
        .split('\n')
        .filter_map(normalize_text)
        .take(MAX_TEXT_ITEMS)
        .map(ExtractedText::new)
        .collect();

    if lines.is_empty() {
        return normalize_text(cleaned)
            .map(|whole| vec![ExtractedText::new(whole)])
            .unwrap_or_default();
    }
    lines
}

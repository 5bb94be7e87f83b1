//! Inbound OCR query, image payloads, and pre-flight validation.

use std::path::Path;

use base64::Engine;
use serde_json::json;
use thiserror::Error;

use super::error::ServiceError;

/// Largest accepted image, in bytes (30 MiB).
pub const MAX_IMAGE_BYTES: usize = 30 * 1024 * 1024;

/// Language codes longer than this are treated as absent.
pub const MAX_LANGUAGE_CODE_CHARS: usize = 20;

/// Language hint that lets the backend decide.
pub const AUTO_LANGUAGE: &str = "auto";

const SUPPORTED_LANGUAGES: [&str; 5] = [AUTO_LANGUAGE, "zh-Hans", "zh-Hant", "en", "ja"];

/// Ordered list of accepted source languages, `auto` first.
///
/// Returns a fresh vector on every call.
pub fn supported_languages() -> Vec<String> {
    SUPPORTED_LANGUAGES.iter().map(|s| s.to_string()).collect()
}

/// Whether a language code can be reported as a result language.
///
/// `auto` is accepted as input but is never a result language.
pub fn is_supported_language(code: &str) -> bool {
    code != AUTO_LANGUAGE && SUPPORTED_LANGUAGES.contains(&code)
}

/// Errors from image payloads.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("image payload is empty")]
    Empty,

    #[error("base64 encoding failed: {0}")]
    Encoding(String),
}

/// Binary image payload handed to the pipeline.
pub trait ImagePayload: Send + Sync + std::fmt::Debug {
    /// Payload length in bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encode the payload as standard base64.
    fn to_base64(&self) -> Result<String, PayloadError>;
}

/// Owned image bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageData {
    bytes: Vec<u8>,
}

impl ImageData {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Read an image file into memory.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl std::fmt::Debug for ImageData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageData")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl ImagePayload for ImageData {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn to_base64(&self) -> Result<String, PayloadError> {
        if self.bytes.is_empty() {
            return Err(PayloadError::Empty);
        }
        Ok(base64::engine::general_purpose::STANDARD.encode(&self.bytes))
    }
}

/// An OCR request: an image plus optional language hints.
#[derive(Debug)]
pub struct OcrQuery {
    pub image: Box<dyn ImagePayload>,
    /// Declared source language.
    pub from: Option<String>,
    /// Language detected by the caller, used when `from` is not decisive.
    pub detect_from: Option<String>,
}

impl OcrQuery {
    pub fn new(image: impl ImagePayload + 'static) -> Self {
        Self {
            image: Box::new(image),
            from: None,
            detect_from: None,
        }
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_detect_from(mut self, detect_from: impl Into<String>) -> Self {
        self.detect_from = Some(detect_from.into());
        self
    }
}

/// Check the image size constraints.
pub fn validate_query(query: &OcrQuery) -> Result<(), ServiceError> {
    let len = query.image.len();
    if len == 0 {
        return Err(ServiceError::param("Image data is empty."));
    }
    if len > MAX_IMAGE_BYTES {
        return Err(
            ServiceError::param("Image is too large; keep it under 30MB.")
                .with_addition(json!({ "imageBytes": len, "maxImageBytes": MAX_IMAGE_BYTES })),
        );
    }
    Ok(())
}

/// Reject declared source languages outside the supported set.
pub fn validate_language(query: &OcrQuery) -> Result<(), ServiceError> {
    match normalize_language_code(query.from.as_deref()) {
        Some(from) if from != AUTO_LANGUAGE && !is_supported_language(from) => Err(
            ServiceError::new(
                super::ErrorKind::UnsupportedLanguage,
                format!("Unsupported source language: {}", from),
            )
            .with_addition(json!({ "supportedLanguages": supported_languages() })),
        ),
        _ => Ok(()),
    }
}

/// Pick the language reported alongside a successful result.
pub fn choose_result_language(query: &OcrQuery) -> Option<String> {
    if let Some(from) = normalize_language_code(query.from.as_deref()) {
        if is_supported_language(from) {
            return Some(from.to_string());
        }
    }

    normalize_language_code(query.detect_from.as_deref())
        .filter(|code| is_supported_language(code))
        .map(str::to_string)
}

/// Trim a language code; blank or overlong codes count as absent.
pub fn normalize_language_code(code: Option<&str>) -> Option<&str> {
    let trimmed = code?.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_LANGUAGE_CODE_CHARS {
        return None;
    }
    Some(trimmed)
}

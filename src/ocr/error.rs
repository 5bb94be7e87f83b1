//! Closed error taxonomy shared by every failure path of the OCR pipeline.
//!
//! Every internal failure is converted into exactly one [`ServiceError`] at
//! the point where it is detected. The message is always non-empty and
//! bounded, and the kind is always one of the closed set in [`ErrorKind`].

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Maximum length of an error message, in characters.
pub const MAX_ERROR_MESSAGE_CHARS: usize = 500;

/// Message used when a caller supplies no usable message.
pub const PLACEHOLDER_MESSAGE: &str = "Unknown error";

/// Kind of a service error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Unclassifiable condition; indicates a gap in classification.
    Unknown,
    /// Malformed caller input or configuration.
    Param,
    /// Requested source language outside the supported set.
    UnsupportedLanguage,
    /// Missing or rejected cloud credential.
    SecretKey,
    /// Transport failure or malformed transport envelope.
    Network,
    /// Well-transported but invalid or error-carrying backend response.
    Api,
    /// Backend succeeded but produced no usable text.
    NotFound,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unknown => "unknown",
            ErrorKind::Param => "param",
            ErrorKind::UnsupportedLanguage => "unsupportedLanguage",
            ErrorKind::SecretKey => "secretKey",
            ErrorKind::Network => "network",
            ErrorKind::Api => "api",
            ErrorKind::NotFound => "notFound",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "unknown" => Some(ErrorKind::Unknown),
            "param" => Some(ErrorKind::Param),
            "unsupportedLanguage" => Some(ErrorKind::UnsupportedLanguage),
            "secretKey" => Some(ErrorKind::SecretKey),
            "network" => Some(ErrorKind::Network),
            "api" => Some(ErrorKind::Api),
            "notFound" => Some(ErrorKind::NotFound),
            _ => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error value reported by every public operation.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{kind}: {message}")]
pub struct ServiceError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
    /// Diagnostic payload for operators (raw backend responses and the like).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addition: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub troubleshooting_link: Option<String>,
}

impl ServiceError {
    /// Create an error with a normalized message.
    pub fn new(kind: ErrorKind, message: impl AsRef<str>) -> Self {
        Self {
            kind,
            message: normalize_error_message(Some(message.as_ref())),
            addition: None,
            troubleshooting_link: None,
        }
    }

    /// Attach a diagnostic payload.
    pub fn with_addition(mut self, addition: Value) -> Self {
        self.addition = Some(addition);
        self
    }

    /// Attach a troubleshooting link. Empty links are ignored.
    pub fn with_troubleshooting_link(mut self, link: impl Into<String>) -> Self {
        let link = link.into();
        if !link.is_empty() {
            self.troubleshooting_link = Some(link);
        }
        self
    }

    pub fn param(message: impl AsRef<str>) -> Self {
        Self::new(ErrorKind::Param, message)
    }

    pub fn network(message: impl AsRef<str>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    pub fn api(message: impl AsRef<str>) -> Self {
        Self::new(ErrorKind::Api, message)
    }

    pub fn not_found(message: impl AsRef<str>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn secret_key(message: impl AsRef<str>) -> Self {
        Self::new(ErrorKind::SecretKey, message)
    }
}

/// Build a service error from loosely-typed parts.
///
/// Never fails: unknown kind names become [`ErrorKind::Unknown`], a missing or
/// blank message becomes [`PLACEHOLDER_MESSAGE`], and blank links are dropped.
pub fn make_service_error(
    type_name: &str,
    message: Option<&str>,
    addition: Option<Value>,
    troubleshooting_link: Option<&str>,
) -> ServiceError {
    let kind = ErrorKind::from_str(type_name).unwrap_or(ErrorKind::Unknown);

    ServiceError {
        kind,
        message: normalize_error_message(message),
        addition,
        troubleshooting_link: troubleshooting_link
            .filter(|link| !link.is_empty())
            .map(str::to_string),
    }
}

fn normalize_error_message(message: Option<&str>) -> String {
    let trimmed = message.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return PLACEHOLDER_MESSAGE.to_string();
    }
    truncate_chars(trimmed, MAX_ERROR_MESSAGE_CHARS)
}

/// Truncate a string to at most `max` characters (UTF-8 safe).
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_kind_coerces() {
        let err = make_service_error("teapot", Some("boom"), None, None);
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert_eq!(err.message, "boom");
    }

    #[test]
    fn test_message_placeholder() {
        assert_eq!(
            make_service_error("api", None, None, None).message,
            PLACEHOLDER_MESSAGE
        );
        assert_eq!(
            make_service_error("api", Some("   "), None, None).message,
            PLACEHOLDER_MESSAGE
        );
    }

    #[test]
    fn test_message_truncated() {
        let long = "错".repeat(700);
        let err = ServiceError::api(&long);
        assert_eq!(err.message.chars().count(), MAX_ERROR_MESSAGE_CHARS);
    }

    #[test]
    fn test_optional_fields() {
        let err = make_service_error("network", Some("down"), None, Some(""));
        assert!(err.addition.is_none());
        assert!(err.troubleshooting_link.is_none());

        let err = make_service_error(
            "network",
            Some("down"),
            Some(json!({"statusCode": 502})),
            Some("https://example.com/help"),
        );
        assert_eq!(err.addition, Some(json!({"statusCode": 502})));
        assert_eq!(
            err.troubleshooting_link.as_deref(),
            Some("https://example.com/help")
        );
    }

    #[test]
    fn test_serialized_shape() {
        let err = ServiceError::secret_key("rejected").with_troubleshooting_link("https://x.test");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "secretKey",
                "message": "rejected",
                "troubleshootingLink": "https://x.test",
            })
        );
    }

    #[test]
    fn test_kind_round_trip_names() {
        for kind in [
            ErrorKind::Unknown,
            ErrorKind::Param,
            ErrorKind::UnsupportedLanguage,
            ErrorKind::SecretKey,
            ErrorKind::Network,
            ErrorKind::Api,
            ErrorKind::NotFound,
        ] {
            assert_eq!(ErrorKind::from_str(kind.as_str()), Some(kind));
        }
    }
}

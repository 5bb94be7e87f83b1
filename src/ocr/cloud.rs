//! Cloud vision backend speaking the chat-completions protocol.

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::classify::{
    append_detail, check_envelope, describe_status, remote_error_message, require_object, Labels,
};
use super::error::ServiceError;
use super::extract::{cleanup_cloud_text, extract_cloud_text, split_cloud_lines, ExtractedText};
use super::runtime::{CloudConfig, ImageDetail};
use super::transport::{Envelope, HttpRequest};

const CHAT_LABELS: Labels = Labels {
    malformed: "Transport returned malformed data for the cloud OCR request.",
    transport: "Request to the cloud OCR API failed",
};

const PROBE_LABELS: Labels = Labels {
    malformed: "Transport returned malformed data for the cloud API check.",
    transport: "Cloud API check failed",
};

/// Keys that can carry recognized text in a cloud response.
const TEXT_SOURCE_KEYS: [&str; 4] = ["output_text", "result", "output", "choices"];

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
    detail: ImageDetail,
}

/// Build the chat-completions request carrying the prompt and the image.
pub fn build_cloud_request(
    config: &CloudConfig,
    image_base64: &str,
) -> Result<HttpRequest, ServiceError> {
    let request = ChatCompletionRequest {
        model: &config.model,
        messages: vec![ChatMessage {
            role: "user",
            content: vec![
                ContentPart::Text {
                    text: &config.prompt,
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/png;base64,{}", image_base64),
                        detail: config.image_detail,
                    },
                },
            ],
        }],
    };
    let body = serde_json::to_value(&request).map_err(|e| {
        ServiceError::new(
            super::ErrorKind::Unknown,
            format!("Failed to encode cloud OCR request: {}", e),
        )
    })?;

    Ok(
        HttpRequest::post_json(config.chat_completions_url(), body, config.request_timeout())
            .with_header("Authorization", config.authorization()),
    )
}

/// Build the `/models` availability probe.
pub fn build_cloud_probe_request(config: &CloudConfig) -> HttpRequest {
    HttpRequest::get(config.models_url(), config.probe_timeout())
        .with_header("Authorization", config.authorization())
}

/// Map a non-200 cloud status to an error.
fn cloud_status_error(status: Option<u16>, data: Value) -> ServiceError {
    let detail = remote_error_message(&data);
    let addition = json!({ "statusCode": status, "data": data });

    let error = match status {
        Some(401) | Some(403) => ServiceError::secret_key(append_detail(
            "Cloud API rejected the API key; check that it is valid and has access",
            detail,
        )),
        Some(404) => ServiceError::not_found(append_detail(
            "Cloud API endpoint not found (404); check the base URL and path",
            detail,
        )),
        _ => ServiceError::api(append_detail(
            &format!("Cloud API returned status {}", describe_status(status)),
            detail,
        )),
    };
    error.with_addition(addition)
}

/// Classify a chat-completions response, returning the body object.
pub fn classify_cloud_response(envelope: Envelope) -> Result<Map<String, Value>, ServiceError> {
    let data = check_envelope(envelope, &CHAT_LABELS, cloud_status_error)?;
    let data = require_object(data, "Cloud API response is not a valid JSON object.")?;

    let has_text_source = TEXT_SOURCE_KEYS.iter().any(|key| data.contains_key(*key));
    if !has_text_source && data.get("error").is_some_and(Value::is_object) {
        let body = Value::Object(data);
        let message = append_detail("Cloud API returned an error", remote_error_message(&body));
        return Err(ServiceError::api(message)
            .with_addition(json!({ "statusCode": 200, "data": body })));
    }

    Ok(data)
}

/// Classify the `/models` probe; any 200 counts as reachable.
pub fn classify_cloud_probe(envelope: Envelope) -> Result<(), ServiceError> {
    check_envelope(envelope, &PROBE_LABELS, cloud_status_error)?;
    Ok(())
}

/// Turn a classified cloud body into recognized lines.
pub fn extract_cloud_texts(
    config: &CloudConfig,
    data: Map<String, Value>,
) -> Result<Vec<ExtractedText>, ServiceError> {
    let data = Value::Object(data);
    let texts = extract_cloud_text(&data)
        .map(|text| split_cloud_lines(&cleanup_cloud_text(&text)))
        .unwrap_or_default();

    if texts.is_empty() {
        return Err(ServiceError::not_found("No usable text was recognized.").with_addition(
            json!({ "baseUrl": config.base_url, "model": config.model, "data": data }),
        ));
    }

    debug!("Cloud OCR produced {} lines", texts.len());
    Ok(texts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::runtime::{build_runtime_config, keys, RuntimeConfig};
    use crate::ocr::transport::TransportEnvelope;
    use crate::ocr::ErrorKind;
    use std::collections::HashMap;

    fn config() -> CloudConfig {
        let options: HashMap<String, String> = [
            (keys::BACKEND_MODE, "cloud"),
            (keys::CLOUD_BASE_URL, "http://h/v1"),
            (keys::CLOUD_API_KEY, "sk-abcdefgh"),
            (keys::CLOUD_MODEL, "vision-mini"),
            (keys::CLOUD_IMAGE_DETAIL, "auto"),
            (keys::CLOUD_PROMPT, "Read it."),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        match build_runtime_config(&options).unwrap() {
            RuntimeConfig::Cloud(config) => config,
            RuntimeConfig::Local(_) => panic!("expected cloud config"),
        }
    }

    fn with_status(status: u16, data: Value) -> Envelope {
        TransportEnvelope::completed(status, Some(data)).into()
    }

    #[test]
    fn test_build_cloud_request() {
        let request = build_cloud_request(&config(), "aGk=").unwrap();
        assert_eq!(request.url, "http://h/v1/chat/completions");
        assert_eq!(request.header("Authorization"), Some("Bearer sk-abcdefgh"));
        assert_eq!(
            request.body,
            Some(json!({
                "model": "vision-mini",
                "messages": [{
                    "role": "user",
                    "content": [
                        {"type": "text", "text": "Read it."},
                        {"type": "image_url", "image_url": {
                            "url": "data:image/png;base64,aGk=",
                            "detail": "auto",
                        }},
                    ],
                }],
            }))
        );

        let probe = build_cloud_probe_request(&config());
        assert_eq!(probe.url, "http://h/v1/models");
        assert_eq!(probe.header("authorization"), Some("Bearer sk-abcdefgh"));
    }

    #[test]
    fn test_status_mapping() {
        let err = classify_cloud_response(with_status(401, json!({"error": {"message": "bad key"}})))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::SecretKey);
        assert!(err.message.ends_with(": bad key"));

        let err = classify_cloud_response(with_status(403, json!({}))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SecretKey);

        let err = classify_cloud_response(with_status(404, json!({}))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let err = classify_cloud_response(with_status(429, json!({"error": {"code": "rate_limited"}})))
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Api);
        assert_eq!(err.message, "Cloud API returned status 429: rate_limited");
        assert_eq!(err.addition.unwrap()["statusCode"], 429);
    }

    #[test]
    fn test_error_only_body_is_api() {
        let err = classify_cloud_response(with_status(
            200,
            json!({"error": {"message": "model overloaded"}}),
        ))
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Api);
        assert!(err.message.contains("model overloaded"));

        assert!(classify_cloud_response(with_status(
            200,
            json!({"error": {"message": "ignored"}, "output_text": "fine"}),
        ))
        .is_ok());
    }

    #[test]
    fn test_extract_cloud_texts() {
        let data = classify_cloud_response(with_status(
            200,
            json!({"choices": [{"message": {"content": "<think>hmm</think>\nFirst\n\nSecond"}}]}),
        ))
        .unwrap();
        let texts: Vec<String> = extract_cloud_texts(&config(), data)
            .unwrap()
            .into_iter()
            .map(|item| item.text)
            .collect();
        assert_eq!(texts, vec!["First", "Second"]);
    }

    #[test]
    fn test_blank_reply_is_not_found() {
        let data = classify_cloud_response(with_status(
            200,
            json!({"choices": [{"message": {"content": "<think>nothing here</think>"}}]}),
        ))
        .unwrap();
        let err = extract_cloud_texts(&config(), data).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        let addition = err.addition.unwrap();
        assert_eq!(addition["baseUrl"], "http://h/v1");
        assert_eq!(addition["model"], "vision-mini");
        assert!(!addition.to_string().contains("sk-abcdefgh"));
    }

    #[test]
    fn test_probe() {
        assert!(classify_cloud_probe(with_status(200, json!({"data": []}))).is_ok());
        assert!(classify_cloud_probe(TransportEnvelope::completed(200, None).into()).is_ok());

        let err = classify_cloud_probe(with_status(401, json!({}))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::SecretKey);
    }
}

//! Local PP-OCR service backend: request building, classification, and text
//! extraction.
//!
//! The service accepts `POST /ocr` with a base64 image and answers with
//! `{logId, errorCode, errorMsg, result: {ocrResults: [{prunedResult: ...}]}}`.
//! `GET /healthz` answers `{status: "ok"}` once the pipeline is loaded.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use super::classify::{append_detail, check_envelope, describe_status, require_object, Labels};
use super::error::ServiceError;
use super::extract::{normalize_extracted_text, ExtractedText, MAX_TEXT_ITEMS};
use super::runtime::LocalConfig;
use super::transport::{Envelope, HttpRequest};

/// The service's code for image input.
const FILE_TYPE_IMAGE: u8 = 1;

const OCR_LABELS: Labels = Labels {
    malformed: "Transport returned malformed data for the OCR request.",
    transport: "Request to the local OCR service failed",
};

const HEALTH_LABELS: Labels = Labels {
    malformed: "Transport returned malformed data for the health check.",
    transport: "Local OCR health check failed",
};

/// Body of a local OCR request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LocalOcrRequest<'a> {
    file: &'a str,
    file_type: u8,
    visualize: bool,
    text_rec_score_thresh: f64,
    use_doc_orientation_classify: bool,
    use_doc_unwarping: bool,
    use_textline_orientation: bool,
}

/// Build the OCR request for a base64-encoded image.
pub fn build_local_request(
    config: &LocalConfig,
    image_base64: &str,
) -> Result<HttpRequest, ServiceError> {
    let body = LocalOcrRequest {
        file: image_base64,
        file_type: FILE_TYPE_IMAGE,
        visualize: false,
        text_rec_score_thresh: config.text_rec_score_thresh,
        use_doc_orientation_classify: config.use_doc_orientation_classify,
        use_doc_unwarping: config.use_doc_unwarping,
        use_textline_orientation: config.use_textline_orientation,
    };
    let body = serde_json::to_value(&body).map_err(|e| {
        ServiceError::new(
            super::ErrorKind::Unknown,
            format!("Failed to encode OCR request: {}", e),
        )
    })?;

    Ok(HttpRequest::post_json(
        config.server_url.clone(),
        body,
        config.request_timeout(),
    ))
}

/// Build the health probe request.
pub fn build_local_health_request(config: &LocalConfig) -> HttpRequest {
    HttpRequest::get(config.health_url(), config.probe_timeout())
}

/// Successful local OCR response.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalPayload {
    pub log_id: Option<Value>,
    /// The `result` object; always carries an `ocrResults` array.
    pub result: Value,
}

/// Classify a local OCR response.
pub fn classify_local_response(envelope: Envelope) -> Result<LocalPayload, ServiceError> {
    let data = check_envelope(envelope, &OCR_LABELS, |status, data| {
        let detail = data
            .get("errorMsg")
            .and_then(Value::as_str)
            .map(str::to_string);
        ServiceError::network(append_detail(
            &format!(
                "Local OCR service returned status {}",
                describe_status(status)
            ),
            detail,
        ))
        .with_addition(json!({ "statusCode": status, "data": data }))
    })?;

    let mut data = require_object(data, "OCR service response is not a valid JSON object.")?;

    let error_code = data.get("errorCode").cloned().unwrap_or(Value::Null);
    let log_id = data.remove("logId");
    if error_code.as_f64() != Some(0.0) {
        let message = data
            .get("errorMsg")
            .and_then(Value::as_str)
            .filter(|msg| !msg.trim().is_empty())
            .unwrap_or("OCR service reported an error.");
        return Err(ServiceError::api(message)
            .with_addition(json!({ "errorCode": error_code, "logId": log_id })));
    }

    let result = data.remove("result").unwrap_or(Value::Null);
    let has_pages = result
        .get("ocrResults")
        .map(Value::is_array)
        .unwrap_or(false);
    if !result.is_object() || !has_pages {
        return Err(ServiceError::api("OCR result structure unexpected.")
            .with_addition(json!({ "result": result })));
    }

    debug!("Local OCR response accepted (logId: {:?})", log_id);
    Ok(LocalPayload { log_id, result })
}

/// Classify a local health probe response.
pub fn classify_local_health(envelope: Envelope) -> Result<(), ServiceError> {
    let data = check_envelope(envelope, &HEALTH_LABELS, |status, data| {
        ServiceError::network(format!(
            "Local OCR health check returned status {}",
            describe_status(status)
        ))
        .with_addition(json!({ "statusCode": status, "data": data }))
    })?;

    if data.get("status").and_then(Value::as_str) != Some("ok") {
        return Err(
            ServiceError::api("Local OCR health check returned unexpected content.")
                .with_addition(json!({ "data": data })),
        );
    }
    Ok(())
}

/// Collect recognized lines across all pages, in order.
///
/// Stops as soon as [`MAX_TEXT_ITEMS`] lines are collected.
pub fn extract_local_texts(payload: &LocalPayload) -> Result<Vec<ExtractedText>, ServiceError> {
    let texts = collect_page_texts(&payload.result);
    if texts.is_empty() {
        return Err(ServiceError::not_found("No usable text was recognized.")
            .with_addition(json!({ "logId": payload.log_id, "result": payload.result })));
    }
    Ok(texts)
}

fn collect_page_texts(result: &Value) -> Vec<ExtractedText> {
    let mut texts = Vec::new();
    let Some(pages) = result.get("ocrResults").and_then(Value::as_array) else {
        return texts;
    };

    for page in pages {
        let Some(rec_texts) = page
            .get("prunedResult")
            .filter(|pruned| pruned.is_object())
            .and_then(|pruned| pruned.get("rec_texts"))
            .and_then(Value::as_array)
        else {
            continue;
        };

        for candidate in rec_texts {
            if texts.len() >= MAX_TEXT_ITEMS {
                return texts;
            }
            if let Some(text) = normalize_extracted_text(candidate) {
                texts.push(ExtractedText::new(text));
            }
        }
    }
    texts
}

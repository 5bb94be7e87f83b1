//! Classification steps shared by every backend response.
//!
//! Order matters: malformed envelope, then transport error, then HTTP status,
//! then body shape. The first failing step produces the error.

use serde_json::{json, Map, Value};
use tracing::warn;

use super::error::ServiceError;
use super::transport::Envelope;

/// Wording used for one classifier's errors.
pub(crate) struct Labels {
    /// Envelope is not an envelope.
    pub malformed: &'static str,
    /// Transport reported an error.
    pub transport: &'static str,
}

/// Run the envelope and transport-error checks, then map non-200 statuses.
///
/// Returns the response body (`Null` when the transport delivered none).
/// An absent status code is treated like any other non-200 status.
pub(crate) fn check_envelope<F>(
    envelope: Envelope,
    labels: &Labels,
    map_status: F,
) -> Result<Value, ServiceError>
where
    F: FnOnce(Option<u16>, Value) -> ServiceError,
{
    let envelope = match envelope {
        Envelope::Malformed(raw) => {
            warn!("{}", labels.malformed);
            return Err(ServiceError::network(labels.malformed).with_addition(raw));
        }
        Envelope::Response(envelope) => envelope,
    };

    if let Some(error) = envelope.transport_error() {
        let message = append_detail(labels.transport, transport_error_message(error));
        warn!("{}", message);
        return Err(ServiceError::network(message).with_addition(json!({
            "error": error,
            "response": envelope.response,
        })));
    }

    let status_code = envelope.status_code();
    let data = envelope.data.unwrap_or(Value::Null);
    if status_code != Some(200) {
        let error = map_status(status_code, data);
        warn!("Backend returned status {}: {}", describe_status(status_code), error);
        return Err(error);
    }

    Ok(data)
}

/// Require the response body to be a JSON object.
pub(crate) fn require_object(
    data: Value,
    message: &str,
) -> Result<Map<String, Value>, ServiceError> {
    match data {
        Value::Object(map) => Ok(map),
        other => Err(ServiceError::api(message).with_addition(json!({ "data": other }))),
    }
}

/// Best-effort error text reported by a remote API body.
///
/// Looks at `message`, then `error.message`, then `error.code`, then a
/// string `error`.
pub(crate) fn remote_error_message(data: &Value) -> Option<String> {
    let candidates = [
        data.get("message").and_then(scalar_text),
        data.get("error")
            .and_then(|error| error.get("message"))
            .and_then(scalar_text),
        data.get("error")
            .and_then(|error| error.get("code"))
            .and_then(scalar_text),
        data.get("error").and_then(Value::as_str).map(str::to_string),
    ];
    candidates
        .into_iter()
        .flatten()
        .find(|text| !text.trim().is_empty())
}

/// `"{base}: {detail}"`, or just `base` when there is no detail.
pub(crate) fn append_detail(base: &str, detail: Option<String>) -> String {
    match detail.as_deref().map(str::trim) {
        Some(detail) if !detail.is_empty() => format!("{}: {}", base, detail),
        _ => base.to_string(),
    }
}

/// Status code as shown in messages.
pub(crate) fn describe_status(status_code: Option<u16>) -> String {
    match status_code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

fn transport_error_message(error: &Value) -> Option<String> {
    match error {
        Value::String(text) => Some(text.clone()),
        Value::Object(map) => map.get("message").and_then(scalar_text),
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

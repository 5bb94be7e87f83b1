//! HTTP transport seam and the response envelope it delivers.
//!
//! The pipeline never talks to reqwest directly. It hands an [`HttpRequest`]
//! to an [`HttpTransport`] together with a handler, and the transport calls
//! the handler with an [`Envelope`] describing what came back.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

const AUTHORIZATION: &str = "Authorization";
const CONTENT_TYPE: &str = "Content-Type";
const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outbound request description.
#[derive(Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// JSON body, sent only for POST.
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout,
        }
    }

    /// JSON POST; sets the content type header.
    pub fn post_json(url: impl Into<String>, body: Value, timeout: Duration) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: vec![(CONTENT_TYPE.to_string(), JSON_CONTENT_TYPE.to_string())],
            body: Some(body),
            timeout,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header value matching `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl std::fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let headers: Vec<(&str, &str)> = self
            .headers
            .iter()
            .map(|(name, value)| {
                if name.eq_ignore_ascii_case(AUTHORIZATION) {
                    (name.as_str(), "<redacted>")
                } else {
                    (name.as_str(), value.as_str())
                }
            })
            .collect();

        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &headers)
            .field("has_body", &self.body.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Response metadata reported by the transport.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseMeta {
    #[serde(rename = "statusCode", default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

/// Well-formed transport result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportEnvelope {
    /// Transport-level failure (connection refused, timeout, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<ResponseMeta>,
    /// Decoded response body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl TransportEnvelope {
    /// Envelope for a completed HTTP exchange.
    pub fn completed(status_code: u16, data: Option<Value>) -> Self {
        Self {
            error: None,
            response: Some(ResponseMeta {
                status_code: Some(status_code),
            }),
            data,
        }
    }

    /// Envelope for a request that never produced a response.
    pub fn failed(error: Value) -> Self {
        Self {
            error: Some(error),
            response: None,
            data: None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        self.response.as_ref().and_then(|meta| meta.status_code)
    }

    /// The transport error, ignoring falsy placeholders.
    pub fn transport_error(&self) -> Option<&Value> {
        self.error.as_ref().filter(|error| match error {
            Value::Null => false,
            Value::Bool(flag) => *flag,
            Value::String(text) => !text.is_empty(),
            Value::Number(number) => number.as_f64() != Some(0.0),
            _ => true,
        })
    }
}

/// What a transport hands back to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// The transport delivered something that is not an envelope at all.
    Malformed(Value),
    Response(TransportEnvelope),
}

impl From<Value> for Envelope {
    fn from(value: Value) -> Self {
        if !value.is_object() {
            return Envelope::Malformed(value);
        }
        match serde_json::from_value::<TransportEnvelope>(value.clone()) {
            Ok(envelope) => Envelope::Response(envelope),
            Err(_) => Envelope::Malformed(value),
        }
    }
}

impl From<TransportEnvelope> for Envelope {
    fn from(envelope: TransportEnvelope) -> Self {
        Envelope::Response(envelope)
    }
}

/// Callback receiving the transport result.
///
/// Transports are expected to call it once, but the pipeline tolerates more.
pub type ResponseHandler = Box<dyn FnMut(Envelope) + Send + 'static>;

/// Issues HTTP requests and reports results through a handler.
pub trait HttpTransport: Send + Sync {
    fn request(&self, request: HttpRequest, handler: ResponseHandler);
}

/// Transport backed by a shared reqwest client on the current tokio runtime.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("ocr-relay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl HttpTransport for ReqwestTransport {
    fn request(&self, request: HttpRequest, mut handler: ResponseHandler) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available for {} {}", request.method, request.url);
            handler(
                TransportEnvelope::failed(json!({
                    "message": "no async runtime available to send the request",
                }))
                .into(),
            );
            return;
        };

        let client = self.client.clone();
        runtime.spawn(async move {
            let envelope = execute(&client, request).await;
            handler(envelope);
        });
    }
}

async fn execute(client: &Client, request: HttpRequest) -> Envelope {
    debug!("{} {}", request.method, request.url);

    let mut builder = match request.method {
        HttpMethod::Get => client.get(&request.url),
        HttpMethod::Post => client.post(&request.url),
    }
    .timeout(request.timeout);

    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if request.method == HttpMethod::Post {
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
    }

    let response = match builder.send().await {
        Ok(response) => response,
        Err(e) => {
            warn!("Request to {} failed: {}", request.url, e);
            return TransportEnvelope::failed(describe_error(&e)).into();
        }
    };

    let status = response.status().as_u16();
    match response.bytes().await {
        Ok(body) => {
            debug!("{} {} -> {} ({} bytes)", request.method, request.url, status, body.len());
            TransportEnvelope::completed(status, parse_body(&body)).into()
        }
        Err(e) => {
            warn!("Reading response from {} failed: {}", request.url, e);
            TransportEnvelope {
                error: Some(describe_error(&e)),
                response: Some(ResponseMeta {
                    status_code: Some(status),
                }),
                data: None,
            }
            .into()
        }
    }
}

fn describe_error(e: &reqwest::Error) -> Value {
    json!({
        "message": e.to_string(),
        "timeout": e.is_timeout(),
        "connect": e.is_connect(),
    })
}

/// Decode a body as JSON, falling back to the raw text.
fn parse_body(body: &[u8]) -> Option<Value> {
    if body.is_empty() {
        return None;
    }
    match serde_json::from_slice(body) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(String::from_utf8_lossy(body).into_owned())),
    }
}

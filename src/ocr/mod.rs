//! OCR mediation between a caller and one of two interchangeable backends.
//!
//! - **Local**: a PP-OCR style HTTP service returning structured JSON
//!   (`POST /ocr`, `GET /healthz`)
//! - **Cloud**: a vision-capable chat-completions API (`/chat/completions`,
//!   `/models`)
//!
//! Either backend's reply is normalized into an ordered list of
//! [`ExtractedText`] lines, and every failure into a [`ServiceError`] from a
//! closed taxonomy.
//!
//! Use [`OcrService`] for the public operations.

mod classify;
mod cloud;
mod completion;
mod error;
mod extract;
mod local;
mod options;
mod query;
mod runtime;
mod service;
mod transport;

pub use cloud::{
    build_cloud_probe_request, build_cloud_request, classify_cloud_probe, classify_cloud_response,
    extract_cloud_texts,
};
pub use completion::Completion;
pub use error::{
    make_service_error, ErrorKind, ServiceError, MAX_ERROR_MESSAGE_CHARS, PLACEHOLDER_MESSAGE,
};
pub use extract::{
    cleanup_cloud_text, extract_cloud_text, extract_message_content, normalize_extracted_text,
    split_cloud_lines, ExtractedText, MAX_TEXT_ITEMS, MAX_TEXT_LENGTH,
};
pub use local::{
    build_local_health_request, build_local_request, classify_local_health,
    classify_local_response, extract_local_texts, LocalPayload,
};
pub use options::{
    option_string, parse_choice, parse_float_in_range, parse_integer_in_range, parse_menu_boolean,
    OptionSource,
};
pub use query::{
    choose_result_language, is_supported_language, normalize_language_code, supported_languages,
    validate_language, validate_query, ImageData, ImagePayload, OcrQuery, PayloadError,
    AUTO_LANGUAGE, MAX_IMAGE_BYTES,
};
pub use runtime::{
    build_runtime_config, keys, normalize_base_url, normalize_server_url, resolve_backend_mode,
    resolve_request_timeout_sec, timeout_budget_seconds, BackendMode, CloudConfig, ImageDetail,
    LocalConfig, RuntimeConfig, DEFAULT_CLOUD_BASE_URL, DEFAULT_CLOUD_PROMPT, DEFAULT_SERVER_URL,
};
pub use service::{OcrResult, OcrService, RawEcho};
pub use transport::{
    Envelope, HttpMethod, HttpRequest, HttpTransport, ReqwestTransport, ResponseHandler,
    ResponseMeta, TransportEnvelope,
};

//! Runtime configuration resolution.
//!
//! Reads raw option strings, selects the backend mode, and assembles a typed
//! [`RuntimeConfig`] for that mode. Parsing is defensive-default except for
//! the fields whose invalidity would otherwise surface as a confusing network
//! failure later: service URLs, the cloud API key, and the cloud model id.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use serde_json::json;

use super::error::{truncate_chars, ServiceError};
use super::options::{
    option_string, parse_choice, parse_float_in_range, parse_integer_in_range, parse_menu_boolean,
    OptionSource,
};

/// Option identifiers understood by the resolver.
pub mod keys {
    pub const BACKEND_MODE: &str = "ocrBackendMode";
    pub const REQUEST_TIMEOUT_SEC: &str = "requestTimeoutSec";
    pub const SERVER_URL: &str = "serverUrl";
    pub const TEXT_REC_SCORE_THRESH: &str = "textRecScoreThresh";
    pub const USE_DOC_ORIENTATION_CLASSIFY: &str = "useDocOrientationClassify";
    pub const USE_DOC_UNWARPING: &str = "useDocUnwarping";
    pub const USE_TEXTLINE_ORIENTATION: &str = "useTextlineOrientation";
    pub const CLOUD_BASE_URL: &str = "cloudBaseUrl";
    pub const CLOUD_API_KEY: &str = "cloudApiKey";
    pub const CLOUD_MODEL: &str = "cloudModel";
    pub const CLOUD_IMAGE_DETAIL: &str = "cloudImageDetail";
    pub const CLOUD_PROMPT: &str = "cloudPrompt";

    /// Every known key, in documentation order.
    pub const ALL: [&str; 12] = [
        BACKEND_MODE,
        REQUEST_TIMEOUT_SEC,
        SERVER_URL,
        TEXT_REC_SCORE_THRESH,
        USE_DOC_ORIENTATION_CLASSIFY,
        USE_DOC_UNWARPING,
        USE_TEXTLINE_ORIENTATION,
        CLOUD_BASE_URL,
        CLOUD_API_KEY,
        CLOUD_MODEL,
        CLOUD_IMAGE_DETAIL,
        CLOUD_PROMPT,
    ];
}

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:50000/ocr";
pub const DEFAULT_CLOUD_BASE_URL: &str = "https://api.openai.com/v1";

pub const DEFAULT_REQUEST_TIMEOUT_SEC: i64 = 30;
pub const MIN_REQUEST_TIMEOUT_SEC: i64 = 5;
pub const MAX_REQUEST_TIMEOUT_SEC: i64 = 180;

const MIN_TIMEOUT_BUDGET_SEC: u64 = 30;
const MAX_TIMEOUT_BUDGET_SEC: u64 = 300;
const TIMEOUT_BUDGET_OVERHEAD_SEC: u64 = 10;

const LOCAL_PROBE_TIMEOUT_SEC: (u64, u64) = (5, 10);
const CLOUD_PROBE_TIMEOUT_SEC: (u64, u64) = (5, 15);

pub const DEFAULT_TEXT_REC_SCORE_THRESH: f64 = 0.0;

const MIN_URL_CHARS: usize = 10;
const MAX_URL_CHARS: usize = 2048;

const MIN_API_KEY_CHARS: usize = 8;
const MAX_API_KEY_CHARS: usize = 4096;

const MIN_MODEL_CHARS: usize = 2;
const MAX_MODEL_CHARS: usize = 200;

pub const MAX_PROMPT_CHARS: usize = 500;

/// Prompt sent to the cloud model when none is configured.
pub const DEFAULT_CLOUD_PROMPT: &str = concat!(
    "Recognize all text in this image. Output only the recognized text, ",
    "one line per visual line, in reading order. ",
    "Do not translate, explain, or add any other content."
);

const LOCAL_OCR_SUFFIX: &str = "/ocr";
const LOCAL_HEALTH_SUFFIX: &str = "/healthz";
const CHAT_COMPLETIONS_SUFFIX: &str = "/chat/completions";
const MODELS_SUFFIX: &str = "/models";

static HTTP_URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[A-Za-z0-9._:-]+(/.*)?$").unwrap());

/// Which OCR provider a call uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendMode {
    /// Local structured-JSON OCR service.
    #[default]
    Local,
    /// Cloud vision-language chat-completions API.
    Cloud,
}

impl BackendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendMode::Local => "local",
            BackendMode::Cloud => "cloud",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Some(BackendMode::Local),
            "cloud" => Some(BackendMode::Cloud),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Detail level requested for the cloud image part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    #[default]
    High,
    Auto,
    Low,
}

impl ImageDetail {
    const CHOICES: [(&'static str, ImageDetail); 3] = [
        ("high", ImageDetail::High),
        ("auto", ImageDetail::Auto),
        ("low", ImageDetail::Low),
    ];
}

/// Settings for the local OCR service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalConfig {
    /// Normalized service URL, always ending in `/ocr`.
    pub server_url: String,
    pub request_timeout_sec: u64,
    pub text_rec_score_thresh: f64,
    pub use_doc_orientation_classify: bool,
    pub use_doc_unwarping: bool,
    pub use_textline_orientation: bool,
}

impl LocalConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }

    /// URL of the service's health endpoint.
    pub fn health_url(&self) -> String {
        match self.server_url.strip_suffix(LOCAL_OCR_SUFFIX) {
            Some(base) => format!("{}{}", base, LOCAL_HEALTH_SUFFIX),
            None => self.server_url.clone(),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        let (min, max) = LOCAL_PROBE_TIMEOUT_SEC;
        Duration::from_secs(self.request_timeout_sec.clamp(min, max))
    }
}

/// Settings for the cloud chat-completions API.
#[derive(Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudConfig {
    /// Normalized base URL without a trailing slash.
    pub base_url: String,
    pub request_timeout_sec: u64,
    #[serde(skip)]
    api_key: String,
    pub model: String,
    pub image_detail: ImageDetail,
    pub prompt: String,
}

impl CloudConfig {
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }

    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    pub fn chat_completions_url(&self) -> String {
        if self.base_url.ends_with(CHAT_COMPLETIONS_SUFFIX) {
            self.base_url.clone()
        } else {
            format!("{}{}", self.base_url, CHAT_COMPLETIONS_SUFFIX)
        }
    }

    pub fn models_url(&self) -> String {
        match self.base_url.strip_suffix(CHAT_COMPLETIONS_SUFFIX) {
            Some(base) => format!("{}{}", base, MODELS_SUFFIX),
            None => format!("{}{}", self.base_url, MODELS_SUFFIX),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        let (min, max) = CLOUD_PROBE_TIMEOUT_SEC;
        Duration::from_secs(self.request_timeout_sec.clamp(min, max))
    }
}

impl std::fmt::Debug for CloudConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudConfig")
            .field("base_url", &self.base_url)
            .field("request_timeout_sec", &self.request_timeout_sec)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("image_detail", &self.image_detail)
            .field("prompt", &self.prompt)
            .finish()
    }
}

/// Fully validated configuration for one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RuntimeConfig {
    Local(LocalConfig),
    Cloud(CloudConfig),
}

impl RuntimeConfig {
    pub fn mode(&self) -> BackendMode {
        match self {
            RuntimeConfig::Local(_) => BackendMode::Local,
            RuntimeConfig::Cloud(_) => BackendMode::Cloud,
        }
    }

    pub fn request_timeout_sec(&self) -> u64 {
        match self {
            RuntimeConfig::Local(config) => config.request_timeout_sec,
            RuntimeConfig::Cloud(config) => config.request_timeout_sec,
        }
    }
}

/// Request timeout shared by both modes.
pub fn resolve_request_timeout_sec(options: &dyn OptionSource) -> u64 {
    let raw = option_string(options, keys::REQUEST_TIMEOUT_SEC);
    let timeout = parse_integer_in_range(
        raw.as_deref(),
        DEFAULT_REQUEST_TIMEOUT_SEC,
        MIN_REQUEST_TIMEOUT_SEC,
        MAX_REQUEST_TIMEOUT_SEC,
    );
    // Clamped to a positive range above.
    timeout as u64
}

/// Overall budget for one call; always exceeds the network timeout.
pub fn timeout_budget_seconds(options: &dyn OptionSource) -> u64 {
    (resolve_request_timeout_sec(options) + TIMEOUT_BUDGET_OVERHEAD_SEC)
        .clamp(MIN_TIMEOUT_BUDGET_SEC, MAX_TIMEOUT_BUDGET_SEC)
}

/// Backend mode; anything other than `local` or `cloud` selects local.
pub fn resolve_backend_mode(options: &dyn OptionSource) -> BackendMode {
    option_string(options, keys::BACKEND_MODE)
        .and_then(|raw| BackendMode::from_str(&raw))
        .unwrap_or_default()
}

/// Resolve the configuration for the selected backend mode.
pub fn build_runtime_config(options: &dyn OptionSource) -> Result<RuntimeConfig, ServiceError> {
    let request_timeout_sec = resolve_request_timeout_sec(options);

    match resolve_backend_mode(options) {
        BackendMode::Local => {
            build_local_config(options, request_timeout_sec).map(RuntimeConfig::Local)
        }
        BackendMode::Cloud => {
            build_cloud_config(options, request_timeout_sec).map(RuntimeConfig::Cloud)
        }
    }
}

fn build_local_config(
    options: &dyn OptionSource,
    request_timeout_sec: u64,
) -> Result<LocalConfig, ServiceError> {
    let raw_url = option_string(options, keys::SERVER_URL)
        .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
    let server_url = normalize_server_url(&raw_url).ok_or_else(|| {
        ServiceError::param(
            "OCR service URL is malformed; use an address starting with http:// or https://.",
        )
        .with_addition(json!({ "serverUrl": raw_url }))
    })?;

    let text_rec_score_thresh = parse_float_in_range(
        option_string(options, keys::TEXT_REC_SCORE_THRESH).as_deref(),
        DEFAULT_TEXT_REC_SCORE_THRESH,
        0.0,
        1.0,
    );
    let flag = |key: &str| parse_menu_boolean(option_string(options, key).as_deref(), false);

    Ok(LocalConfig {
        server_url,
        request_timeout_sec,
        text_rec_score_thresh,
        use_doc_orientation_classify: flag(keys::USE_DOC_ORIENTATION_CLASSIFY),
        use_doc_unwarping: flag(keys::USE_DOC_UNWARPING),
        use_textline_orientation: flag(keys::USE_TEXTLINE_ORIENTATION),
    })
}

fn build_cloud_config(
    options: &dyn OptionSource,
    request_timeout_sec: u64,
) -> Result<CloudConfig, ServiceError> {
    let raw_url = option_string(options, keys::CLOUD_BASE_URL)
        .unwrap_or_else(|| DEFAULT_CLOUD_BASE_URL.to_string());
    let base_url = normalize_base_url(&raw_url).ok_or_else(|| {
        ServiceError::param(
            "Cloud API base URL is malformed; use an address starting with http:// or https://.",
        )
        .with_addition(json!({ "baseUrl": raw_url }))
    })?;

    let api_key = resolve_api_key(options)?;

    let model = option_string(options, keys::CLOUD_MODEL).unwrap_or_default();
    let model_chars = model.chars().count();
    if !(MIN_MODEL_CHARS..=MAX_MODEL_CHARS).contains(&model_chars) {
        return Err(ServiceError::param(format!(
            "Cloud model id must be {}-{} characters.",
            MIN_MODEL_CHARS, MAX_MODEL_CHARS
        ))
        .with_addition(json!({ "modelLength": model_chars })));
    }

    let image_detail = parse_choice(
        option_string(options, keys::CLOUD_IMAGE_DETAIL).as_deref(),
        &ImageDetail::CHOICES,
        ImageDetail::default(),
    );

    let prompt = match option_string(options, keys::CLOUD_PROMPT) {
        Some(prompt) => truncate_chars(&prompt, MAX_PROMPT_CHARS),
        None => DEFAULT_CLOUD_PROMPT.to_string(),
    };

    Ok(CloudConfig {
        base_url,
        request_timeout_sec,
        api_key,
        model,
        image_detail,
        prompt,
    })
}

/// The API key is the only field whose failures map to `secretKey`.
fn resolve_api_key(options: &dyn OptionSource) -> Result<String, ServiceError> {
    let Some(api_key) = option_string(options, keys::CLOUD_API_KEY) else {
        return Err(ServiceError::secret_key(
            "Cloud API key is missing; set it in the plugin options.",
        ));
    };

    let chars = api_key.chars().count();
    if chars < MIN_API_KEY_CHARS {
        return Err(
            ServiceError::secret_key("Cloud API key is too short.")
                .with_addition(json!({ "apiKeyLength": chars })),
        );
    }
    if chars > MAX_API_KEY_CHARS {
        return Err(
            ServiceError::secret_key("Cloud API key is too long.")
                .with_addition(json!({ "apiKeyLength": chars })),
        );
    }
    Ok(api_key)
}

/// Normalize a local service URL, forcing the `/ocr` suffix.
pub fn normalize_server_url(input: &str) -> Option<String> {
    let mut url = normalize_http_url(input)?;
    if !url.ends_with(LOCAL_OCR_SUFFIX) {
        url.push_str(LOCAL_OCR_SUFFIX);
    }
    Some(url)
}

/// Normalize a cloud base URL (no suffix is forced).
pub fn normalize_base_url(input: &str) -> Option<String> {
    normalize_http_url(input)
}

fn normalize_http_url(input: &str) -> Option<String> {
    let value = input.trim();
    let chars = value.chars().count();
    if !(MIN_URL_CHARS..=MAX_URL_CHARS).contains(&chars) {
        return None;
    }
    if !HTTP_URL_PATTERN.is_match(value) {
        return None;
    }
    Some(value.trim_end_matches('/').to_string())
}

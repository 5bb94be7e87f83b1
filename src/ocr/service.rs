//! Public OCR operations.
//!
//! [`OcrService`] ties the pipeline together: validation, configuration,
//! request building, dispatch through the transport, classification, and text
//! extraction. Every operation reports through its completion callback exactly
//! once, no matter how often the transport fires.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::cloud::{
    build_cloud_probe_request, build_cloud_request, classify_cloud_probe, classify_cloud_response,
    extract_cloud_texts,
};
use super::completion::Completion;
use super::error::ServiceError;
use super::extract::ExtractedText;
use super::local::{
    build_local_health_request, build_local_request, classify_local_health,
    classify_local_response, extract_local_texts,
};
use super::options::OptionSource;
use super::query::{
    choose_result_language, supported_languages, validate_language, validate_query, OcrQuery,
};
use super::runtime::{build_runtime_config, timeout_budget_seconds, RuntimeConfig};
use super::transport::{Envelope, HttpRequest, HttpTransport};

/// Backend-tagged copy of the raw response, for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum RawEcho {
    Local {
        #[serde(rename = "logId")]
        log_id: Option<Value>,
        result: Value,
    },
    Cloud {
        #[serde(rename = "baseUrl")]
        base_url: String,
        model: String,
        data: Value,
    },
}

/// Successful OCR outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrResult {
    /// Recognized lines in reading order; never empty.
    pub texts: Vec<ExtractedText>,
    /// Resolved source language, when one could be determined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub raw: RawEcho,
}

impl OcrResult {
    /// Recognized lines joined with newlines.
    pub fn joined_text(&self) -> String {
        self.texts
            .iter()
            .map(|item| item.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// OCR mediator over a transport and an option source.
#[derive(Clone)]
pub struct OcrService {
    transport: Arc<dyn HttpTransport>,
    options: Arc<dyn OptionSource>,
}

impl OcrService {
    pub fn new(transport: Arc<dyn HttpTransport>, options: Arc<dyn OptionSource>) -> Self {
        Self { transport, options }
    }

    /// Accepted source languages, `auto` first.
    pub fn supported_languages(&self) -> Vec<String> {
        supported_languages()
    }

    /// Upper bound on how long one operation may take, in seconds.
    pub fn timeout_budget_seconds(&self) -> u64 {
        timeout_budget_seconds(self.options.as_ref())
    }

    /// Resolve the configuration the next call would use.
    pub fn runtime_config(&self) -> Result<RuntimeConfig, ServiceError> {
        build_runtime_config(self.options.as_ref())
    }

    /// Probe the selected backend.
    pub fn validate<F>(&self, completion: F)
    where
        F: FnOnce(Result<(), ServiceError>) + Send + 'static,
    {
        let completion = Completion::new(completion);

        let config = match self.runtime_config() {
            Ok(config) => config,
            Err(e) => {
                warn!("Configuration rejected: {}", e);
                completion.complete(Err(e));
                return;
            }
        };

        match config {
            RuntimeConfig::Local(local) => {
                let request = build_local_health_request(&local);
                self.dispatch(request, classify_local_health, completion);
            }
            RuntimeConfig::Cloud(cloud) => {
                let request = build_cloud_probe_request(&cloud);
                self.dispatch(request, classify_cloud_probe, completion);
            }
        }
    }

    /// Recognize the text in `query.image`.
    pub fn ocr<F>(&self, query: &OcrQuery, completion: F)
    where
        F: FnOnce(Result<OcrResult, ServiceError>) + Send + 'static,
    {
        let completion = Completion::new(completion);

        let (config, request) = match self.prepare(query) {
            Ok(prepared) => prepared,
            Err(e) => {
                warn!("OCR request rejected: {}", e);
                completion.complete(Err(e));
                return;
            }
        };
        let from = choose_result_language(query);

        match config {
            RuntimeConfig::Local(_) => {
                let finish = move |envelope: Envelope| {
                    let payload = classify_local_response(envelope)?;
                    let texts = extract_local_texts(&payload)?;
                    Ok(OcrResult {
                        texts,
                        from: from.clone(),
                        raw: RawEcho::Local {
                            log_id: payload.log_id,
                            result: payload.result,
                        },
                    })
                };
                self.dispatch(request, finish, completion);
            }
            RuntimeConfig::Cloud(cloud) => {
                let finish = move |envelope: Envelope| {
                    let data = classify_cloud_response(envelope)?;
                    let texts = extract_cloud_texts(&cloud, data.clone())?;
                    Ok(OcrResult {
                        texts,
                        from: from.clone(),
                        raw: RawEcho::Cloud {
                            base_url: cloud.base_url.clone(),
                            model: cloud.model.clone(),
                            data: Value::Object(data),
                        },
                    })
                };
                self.dispatch(request, finish, completion);
            }
        }
    }

    /// Async form of [`OcrService::validate`].
    pub async fn validate_backend(&self) -> Result<(), ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.validate(move |result| {
            let _ = tx.send(result);
        });
        self.await_completion(rx).await
    }

    /// Async form of [`OcrService::ocr`].
    pub async fn perform_ocr(&self, query: &OcrQuery) -> Result<OcrResult, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.ocr(query, move |result| {
            let _ = tx.send(result);
        });
        self.await_completion(rx).await
    }

    async fn await_completion<T>(
        &self,
        rx: oneshot::Receiver<Result<T, ServiceError>>,
    ) -> Result<T, ServiceError> {
        let budget = self.timeout_budget_seconds();
        match tokio::time::timeout(Duration::from_secs(budget), rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ServiceError::network(
                "The request ended without a response from the transport.",
            )),
            Err(_) => Err(ServiceError::network(format!(
                "No response within the {}s budget.",
                budget
            ))),
        }
    }

    /// Everything that can fail before a request leaves the process.
    fn prepare(&self, query: &OcrQuery) -> Result<(RuntimeConfig, HttpRequest), ServiceError> {
        validate_query(query)?;
        validate_language(query)?;
        let config = self.runtime_config()?;

        let image_base64 = match query.image.to_base64() {
            Ok(encoded) if !encoded.is_empty() => encoded,
            Ok(_) => {
                error!("Image payload encoded to an empty string");
                return Err(image_encoding_error());
            }
            Err(e) => {
                error!("Failed to base64-encode image payload: {}", e);
                return Err(image_encoding_error());
            }
        };

        let request = match &config {
            RuntimeConfig::Local(local) => build_local_request(local, &image_base64)?,
            RuntimeConfig::Cloud(cloud) => build_cloud_request(cloud, &image_base64)?,
        };
        Ok((config, request))
    }

    fn dispatch<T, F>(
        &self,
        request: HttpRequest,
        finish: F,
        completion: Completion<Result<T, ServiceError>>,
    ) where
        T: 'static,
        F: Fn(Envelope) -> Result<T, ServiceError> + Send + 'static,
    {
        info!("{} {}", request.method, request.url);

        self.transport.request(
            request,
            Box::new(move |envelope| {
                if completion.is_completed() {
                    debug!("Dropping duplicate transport response");
                    return;
                }
                let outcome = finish(envelope);
                if let Err(e) = &outcome {
                    debug!("Response classified as {}", e.kind);
                }
                completion.complete(outcome);
            }),
        );
    }
}

fn image_encoding_error() -> ServiceError {
    ServiceError::param("Image data could not be base64-encoded; please try again.")
}

impl std::fmt::Debug for OcrService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrService").finish_non_exhaustive()
    }
}

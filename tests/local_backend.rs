//! End-to-end tests of the local OCR backend against a mock PP-OCR service.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ocr_relay::ocr::{keys, ErrorKind, ImageData, OcrQuery, OcrService, ReqwestTransport};

fn service(pairs: &[(&str, String)]) -> OcrService {
    let options: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    OcrService::new(Arc::new(ReqwestTransport::default()), Arc::new(options))
}

fn local_service(server: &MockServer) -> OcrService {
    service(&[(keys::SERVER_URL, server.uri())])
}

fn query() -> OcrQuery {
    OcrQuery::new(ImageData::new(b"\x89PNG fake image".to_vec()))
}

fn texts(result: &ocr_relay::OcrResult) -> Vec<&str> {
    result.texts.iter().map(|item| item.text.as_str()).collect()
}

#[tokio::test]
async fn test_local_ocr_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ocr"))
        .and(header("Content-Type", "application/json"))
        .and(body_partial_json(json!({
            "fileType": 1,
            "visualize": false,
            "useDocUnwarping": true,
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "logId": "req-42",
            "errorCode": 0,
            "errorMsg": "Success",
            "result": {"ocrResults": [
                {"prunedResult": {"rec_texts": ["  Hello  ", "", "World"], "rec_scores": [0.9, 0.1, 0.8]}},
                {"prunedResult": {"rec_texts": ["Page two"]}},
            ]},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = service(&[
        (keys::SERVER_URL, format!("{}/", server.uri())),
        (keys::USE_DOC_UNWARPING, "true".to_string()),
    ]);
    let result = service
        .perform_ocr(&query().with_from("zh-Hans"))
        .await
        .unwrap();

    assert_eq!(texts(&result), vec!["Hello", "World", "Page two"]);
    assert_eq!(result.from.as_deref(), Some("zh-Hans"));

    let raw = serde_json::to_value(&result.raw).unwrap();
    assert_eq!(raw["backend"], "local");
    assert_eq!(raw["logId"], "req-42");
}

#[tokio::test]
async fn test_local_caps_text_items() {
    let server = MockServer::start().await;
    let many: Vec<String> = (0..600).map(|i| format!("line {}", i)).collect();

    Mock::given(method("POST"))
        .and(path("/ocr"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorCode": 0,
            "result": {"ocrResults": [
                {"prunedResult": {"rec_texts": many}},
                {"prunedResult": {"rec_texts": ["never reached"]}},
            ]},
        })))
        .mount(&server)
        .await;

    let result = local_service(&server).perform_ocr(&query()).await.unwrap();
    assert_eq!(result.texts.len(), 500);
    assert_eq!(result.texts[0].text, "line 0");
    assert_eq!(result.texts[499].text, "line 499");
}

#[tokio::test]
async fn test_local_empty_pages_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ocr"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "logId": "empty",
            "errorCode": 0,
            "result": {"ocrResults": [{"prunedResult": {"rec_texts": []}}]},
        })))
        .mount(&server)
        .await;

    let err = local_service(&server)
        .perform_ocr(&query())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.addition.unwrap()["logId"], "empty");
}

#[tokio::test]
async fn test_local_error_code_is_api() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ocr"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "logId": "bad",
            "errorCode": 1001,
            "errorMsg": "Invalid image",
        })))
        .mount(&server)
        .await;

    let err = local_service(&server)
        .perform_ocr(&query())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Api);
    assert_eq!(err.message, "Invalid image");
}

#[tokio::test]
async fn test_local_non_200_is_network() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ocr"))
        .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
        .mount(&server)
        .await;

    let err = local_service(&server)
        .perform_ocr(&query())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Network);
    let addition = err.addition.unwrap();
    assert_eq!(addition["statusCode"], 500);
    assert_eq!(addition["data"], "Internal Server Error");
}

#[tokio::test]
async fn test_local_unreachable_is_network() {
    // Nothing listens on the discard port.
    let service = service(&[(keys::SERVER_URL, "http://127.0.0.1:9".to_string())]);
    let err = service.perform_ocr(&query()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Network);
    assert!(err.addition.unwrap().get("error").is_some());
}

#[tokio::test]
async fn test_local_health_check() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/healthz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    local_service(&server).validate_backend().await.unwrap();
}

#[tokio::test]
async fn test_local_health_not_ready() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/healthz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "loading"})))
        .mount(&server)
        .await;

    let err = local_service(&server).validate_backend().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Api);
}

#[tokio::test]
async fn test_invalid_server_url_never_hits_network() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let service = service(&[(keys::SERVER_URL, "ftp://h".to_string())]);
    let err = service.perform_ocr(&query()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Param);
    assert_eq!(err.addition.unwrap()["serverUrl"], "ftp://h");
}

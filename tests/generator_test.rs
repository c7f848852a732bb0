//! Gemini client against a mock HTTP server

use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use autopost::config::GeneratorConfig;
use autopost::error::{Error, ErrorCategory};
use autopost::generator::{ContentGenerator, GeminiClient};
use autopost::models::Credential;

const GENERATE_PATH: &str = "/v1beta/models/gemini-1.5-flash:generateContent";

fn client_for(server: &MockServer) -> GeminiClient {
    let config = GeneratorConfig {
        endpoint: server.uri(),
        requests_per_minute: 600,
        timeout_secs: 5,
        ..Default::default()
    };
    GeminiClient::new(&config).unwrap()
}

fn credential() -> Credential {
    Credential::new("GEMINI_API_KEY1", "secret-1")
}

fn candidate(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{ "content": { "parts": [{ "text": text }] } }]
    })
}

#[tokio::test]
async fn test_generate_splits_title_from_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "secret-1"))
        .and(body_string_contains("키워드: 캠핑"))
        .respond_with(ResponseTemplate::new(200).set_body_json(candidate(
            "제목: **캠핑 초보 가이드**\n<h1>캠핑</h1>\n<p>본문</p>",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let content = client_for(&server)
        .generate("캠핑", &credential())
        .await
        .unwrap();

    assert_eq!(content.title, "캠핑 초보 가이드");
    assert!(content.content.starts_with("<h1>캠핑</h1>"));
    assert!(!content.content.contains("제목:"));
    assert!(content.is_complete());
}

#[tokio::test]
async fn test_response_parts_are_joined() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [
                { "text": "제목: 둘로 나뉜 응답\n" },
                { "text": "<p>이어지는 본문</p>" }
            ] } }]
        })))
        .mount(&server)
        .await;

    let content = client_for(&server)
        .generate("split", &credential())
        .await
        .unwrap();

    assert_eq!(content.title, "둘로 나뉜 응답");
    assert_eq!(content.content, "<p>이어지는 본문</p>");
}

#[tokio::test]
async fn test_missing_title_line_yields_incomplete_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(candidate("<p>제목 없는 글</p>")))
        .mount(&server)
        .await;

    let content = client_for(&server)
        .generate("untitled", &credential())
        .await
        .unwrap();

    assert!(content.title.is_empty());
    assert!(!content.is_complete());
}

#[tokio::test]
async fn test_too_many_requests_is_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(429).set_body_string("quota exceeded"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .generate("busy", &credential())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RateLimited(_)));
    assert!(err.is_rate_limited());
    assert!(err.is_recoverable());
    assert_eq!(err.category(), ErrorCategory::Network);
}

#[tokio::test]
async fn test_server_error_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .generate("broken", &credential())
        .await
        .unwrap_err();

    match err {
        Error::Api { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "internal");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_candidates_is_generation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .generate("silent", &credential())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ContentGeneration(_)));
}

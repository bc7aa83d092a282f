use std::sync::Arc;
use std::time::Duration;

use relia_core::clock::FixedClock;
use relia_core::config::ReliaConfig;
use relia_core::errors::AnalysisError;
use relia_core::model::{AnalyzeRequest, ResultSource};
use relia_core::providers::llm::gemini::GeminiClient;
use relia_core::providers::llm::AnalysisClient;
use relia_core::storage::MemoryStore;
use relia_core::ReliabilityService;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request() -> AnalyzeRequest {
    AnalyzeRequest {
        make: "Mazda".into(),
        model: "3".into(),
        year: 2019,
        fuel: "gasoline".into(),
        transmission: "automatic".into(),
        mileage_bucket: "50,000-100,000".into(),
        ..Default::default()
    }
}

fn answer(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    })
}

#[tokio::test]
async fn gemini_returns_candidate_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-2.5-flash:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer("{\"base_score_calculated\": 84}")))
        .mount(&server)
        .await;

    let client = GeminiClient::with_config("test-key", server.uri(), Duration::from_secs(5)).unwrap();
    let raw = client.evaluate("gemini-2.5-flash", &request()).await.unwrap();
    assert_eq!(raw.text, "{\"base_score_calculated\": 84}");
    assert_eq!(raw.backend, "gemini-2.5-flash");
}

#[tokio::test]
async fn gemini_maps_status_codes() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/busy:generateContent"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/models/bad:generateContent"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid argument"))
        .mount(&server)
        .await;

    let client = GeminiClient::with_config("k", server.uri(), Duration::from_secs(5)).unwrap();

    let busy = client.evaluate("busy", &request()).await.unwrap_err();
    assert!(busy.is_retryable());
    assert!(matches!(
        busy,
        AnalysisError::Service {
            http_status: Some(503),
            ..
        }
    ));

    let bad = client.evaluate("bad", &request()).await.unwrap_err();
    assert!(!bad.is_retryable());
}

#[tokio::test]
async fn gemini_empty_candidates_are_retryable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [],
            "promptFeedback": {"blockReason": "OTHER"}
        })))
        .mount(&server)
        .await;

    let client = GeminiClient::with_config("k", server.uri(), Duration::from_secs(5)).unwrap();
    let err = client.evaluate("m", &request()).await.unwrap_err();
    assert!(err.is_retryable());
    assert!(err.to_string().contains("OTHER"));
}

#[tokio::test]
async fn service_falls_back_to_second_model_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/primary:generateContent"))
        .respond_with(ResponseTemplate::new(404).set_body_string("model not found"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/models/secondary:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer(
            "```json\n{\"base_score_calculated\": \"81\", \"reliability_summary\": \"solid\", \"sources\": [\"a\",]}\n```",
        )))
        .expect(1)
        .mount(&server)
        .await;

    let mut cfg = ReliaConfig::default();
    cfg.analysis.primary_model = "primary".into();
    cfg.analysis.fallback_model = Some("secondary".into());
    cfg.analysis.backoff_ms = 0;

    let store = Arc::new(MemoryStore::new());
    let client = Arc::new(GeminiClient::with_config("k", server.uri(), Duration::from_secs(5)).unwrap());
    let service = ReliabilityService::new(&cfg, store.clone(), client, Arc::new(FixedClock(chrono::Utc::now())));

    let resp = service
        .analyze("u1", &request(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(resp.source, ResultSource::Model);
    assert_eq!(resp.result.score, Some(81));
    assert_eq!(resp.result.sources, vec!["a"]);
    assert_eq!(store.append_count(), 1);
}

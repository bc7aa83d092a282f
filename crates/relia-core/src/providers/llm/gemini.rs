//! Gemini `generateContent` adapter.

use super::{AnalysisClient, RawAnalysis};
use crate::errors::AnalysisError;
use crate::model::AnalyzeRequest;
use crate::providers::prompt::build_prompt;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, AnalysisError> {
        Self::with_config(api_key, DEFAULT_BASE_URL, Duration::from_secs(60))
    }

    /// Reads the key from `key_env`.
    pub fn from_env(
        key_env: &str,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let api_key = std::env::var(key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AnalysisError::Config(format!("{} not set", key_env)))?;
        Self::with_config(api_key, base_url, timeout)
    }

    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let key = HeaderValue::from_str(&api_key.into())
            .map_err(|_| AnalysisError::Config("invalid API key format".into()))?;
        headers.insert("x-goog-api-key", key);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| AnalysisError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, backend: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, backend)
    }
}

/// 429 and 5xx may clear up on their own; everything else will not.
fn status_is_retryable(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

fn response_text(body: &Value) -> Option<String> {
    let parts = body.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    (!text.trim().is_empty()).then_some(text)
}

#[async_trait]
impl AnalysisClient for GeminiClient {
    async fn evaluate(
        &self,
        backend: &str,
        query: &AnalyzeRequest,
    ) -> Result<RawAnalysis, AnalysisError> {
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": build_prompt(query)}]}],
            "generationConfig": {"temperature": 0.2},
        });

        let resp = self.client.post(self.url(backend)).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            let detail: String = detail.chars().take(500).collect();
            return Err(AnalysisError::Service {
                backend: backend.to_string(),
                message: format!("HTTP {}: {}", status.as_u16(), detail),
                retryable: status_is_retryable(status.as_u16()),
                http_status: Some(status.as_u16()),
            });
        }

        let body: Value = resp.json().await?;
        let text = response_text(&body).ok_or_else(|| {
            let reason = body
                .pointer("/candidates/0/finishReason")
                .or_else(|| body.pointer("/promptFeedback/blockReason"))
                .and_then(Value::as_str)
                .unwrap_or("no content");
            AnalysisError::service(backend, format!("empty response ({})", reason), true)
        })?;

        Ok(RawAnalysis {
            text,
            backend: backend.to_string(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(status_is_retryable(429));
        assert!(status_is_retryable(503));
        assert!(!status_is_retryable(400));
        assert!(!status_is_retryable(404));
    }

    #[test]
    fn joins_text_parts() {
        let body = json!({"candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": " 1}"}]}}]});
        assert_eq!(response_text(&body).as_deref(), Some("{\"a\": 1}"));
        assert_eq!(response_text(&json!({"candidates": []})), None);
    }
}

use super::{AnalysisClient, RawAnalysis};
use crate::errors::AnalysisError;
use crate::model::AnalyzeRequest;
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// One scripted answer.
#[derive(Debug, Clone)]
pub enum FakeReply {
    /// The canned payload for the query.
    Canned,
    Text(String),
    Fail { message: String, retryable: bool },
    /// Never answers; only cancellation or a timeout ends the call.
    Hang,
}

/// Offline client: deterministic canned payloads, optionally scripted.
#[derive(Debug)]
pub struct FakeAnalysisClient {
    score: i64,
    script: Mutex<VecDeque<FakeReply>>,
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl Default for FakeAnalysisClient {
    fn default() -> Self {
        Self::new(72)
    }
}

impl FakeAnalysisClient {
    pub fn new(score: i64) -> Self {
        Self {
            score,
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Replies are consumed in order; once exhausted every call is `Canned`.
    pub fn scripted(replies: Vec<FakeReply>) -> Self {
        let c = Self::default();
        if let Ok(mut s) = c.script.lock() {
            s.extend(replies);
        }
        c
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Backends called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn canned_payload(&self, query: &AnalyzeRequest) -> String {
        json!({
            "search_performed": true,
            "score_breakdown": {
                "engine_transmission_score": 8,
                "electrical_score": 7,
                "suspension_brakes_score": 7,
                "maintenance_cost_score": 6,
                "satisfaction_score": 8,
                "recalls_score": 9
            },
            "base_score_calculated": self.score,
            "common_issues": ["water pump wear", "infotainment freezes"],
            "avg_repair_cost_ILS": 1800,
            "issues_with_costs": [
                {"issue": "water pump wear", "avg_cost_ILS": 1500, "source": "owner forums", "severity": "medium"}
            ],
            "reliability_summary": format!("{} {} {}: generally dependable.", query.make, query.model, query.year),
            "sources": ["https://example.org/reliability"],
            "recommended_checks": ["cooling system pressure test"],
            "common_competitors_brief": [
                {"model": "Competitor A", "brief_summary": "similar reliability"}
            ]
        })
        .to_string()
    }
}

#[async_trait]
impl AnalysisClient for FakeAnalysisClient {
    async fn evaluate(
        &self,
        backend: &str,
        query: &AnalyzeRequest,
    ) -> Result<RawAnalysis, AnalysisError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(backend.to_string());
        }
        let reply = self
            .script
            .lock()
            .ok()
            .and_then(|mut s| s.pop_front())
            .unwrap_or(FakeReply::Canned);

        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }

        let text = match reply {
            FakeReply::Canned => self.canned_payload(query),
            FakeReply::Text(t) => t,
            FakeReply::Fail { message, retryable } => {
                return Err(AnalysisError::service(backend, message, retryable));
            }
            FakeReply::Hang => return std::future::pending().await,
        };
        Ok(RawAnalysis {
            text,
            backend: backend.to_string(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

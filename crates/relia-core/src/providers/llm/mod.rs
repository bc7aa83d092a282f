use crate::errors::AnalysisError;
use crate::model::AnalyzeRequest;
use async_trait::async_trait;

pub mod fake;
pub mod gemini;

/// Unparsed service answer.
#[derive(Debug, Clone)]
pub struct RawAnalysis {
    pub text: String,
    pub backend: String,
}

/// External analysis service. `backend` selects the underlying model.
#[async_trait]
pub trait AnalysisClient: Send + Sync {
    async fn evaluate(
        &self,
        backend: &str,
        query: &AnalyzeRequest,
    ) -> Result<RawAnalysis, AnalysisError>;

    fn provider_name(&self) -> &'static str;
}

pub mod llm;
pub mod payload;
pub mod prompt;

use crate::config::{AnalysisSettings, ProviderKind};
use crate::errors::AnalysisError;
use llm::fake::FakeAnalysisClient;
use llm::gemini::GeminiClient;
use llm::AnalysisClient;
use std::sync::Arc;
use std::time::Duration;

/// Client for the configured provider.
pub fn build_client(settings: &AnalysisSettings) -> Result<Arc<dyn AnalysisClient>, AnalysisError> {
    match settings.provider {
        ProviderKind::Gemini => Ok(Arc::new(GeminiClient::from_env(
            &settings.api_key_env,
            settings.base_url.clone(),
            Duration::from_millis(settings.timeout_ms),
        )?)),
        ProviderKind::Fake => Ok(Arc::new(FakeAnalysisClient::default())),
    }
}

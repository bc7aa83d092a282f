use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorReport {
    pub schema_version: u32,  // 1
    pub generated_at: String, // rfc3339
    pub relia_version: String,
    pub platform: PlatformInfo,

    pub store: StoreSummary,
    pub analysis: AnalysisSummary,
    pub quota: QuotaSummary,

    pub suggested_actions: Vec<SuggestedAction>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub os: String,
    pub arch: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSummary {
    pub location: String,
    pub reachable: bool,
    pub error: Option<String>,
    pub present_columns: Vec<String>,
    pub missing_columns: Vec<String>,
    pub row_count: Option<u64>,
    pub fresh_rows: Option<u64>,
    pub rows_today: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub provider: String,
    pub backends: Vec<String>,
    pub api_key_env: String,
    pub api_key_present: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaSummary {
    pub global_daily: u32,
    pub per_caller_daily: u32,
    pub global_left: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedAction {
    pub title: String,
    pub why: String,
    pub steps: Vec<String>, // copy/paste commands
}

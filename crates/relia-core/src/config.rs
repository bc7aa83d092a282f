use crate::cache::selector::{DEFAULT_FRESHNESS_DAYS, MAX_FRESHNESS_DAYS};
use crate::errors::ConfigError;
use crate::normalize::NormalizeMode;
use crate::on_error::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SUPPORTED_CONFIG_VERSION: u32 = 1;
pub const DEFAULT_CONFIG_FILE: &str = "relia.yaml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliaConfig {
    #[serde(default = "default_version", rename = "configVersion", alias = "version")]
    pub version: u32,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub quota: QuotaSettings,
    #[serde(default)]
    pub analysis: AnalysisSettings,
    #[serde(default)]
    pub log_level: Option<String>,
}

fn default_version() -> u32 {
    SUPPORTED_CONFIG_VERSION
}

impl Default for ReliaConfig {
    fn default() -> Self {
        Self {
            version: SUPPORTED_CONFIG_VERSION,
            store: StoreSettings::default(),
            cache: CacheSettings::default(),
            quota: QuotaSettings::default(),
            analysis: AnalysisSettings::default(),
            log_level: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub path: PathBuf,
    pub timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".relia/evaluations.db"),
            timeout_ms: 5_000,
        }
    }
}

impl StoreSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub freshness_days: i64,
    pub strict_threshold: f64,
    pub loose_threshold: f64,
    pub mileage_threshold: f64,
    pub aggregate_min_hits: usize,
    pub normalize: NormalizeMode,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            freshness_days: DEFAULT_FRESHNESS_DAYS,
            strict_threshold: crate::similarity::STRICT_THRESHOLD,
            loose_threshold: crate::similarity::LOOSE_THRESHOLD,
            mileage_threshold: crate::mileage::MILEAGE_THRESHOLD,
            aggregate_min_hits: crate::cache::aggregate::DEFAULT_MIN_HITS,
            normalize: NormalizeMode::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaSettings {
    pub global_daily: u32,
    /// 0 disables the per-caller ceiling.
    pub per_caller_daily: u32,
    pub on_store_error: FailurePolicy,
}

impl Default for QuotaSettings {
    fn default() -> Self {
        Self {
            global_daily: crate::quota::DEFAULT_GLOBAL_DAILY,
            per_caller_daily: crate::quota::DEFAULT_PER_CALLER_DAILY,
            on_store_error: FailurePolicy::Block,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Gemini,
    Fake,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub provider: ProviderKind,
    pub primary_model: String,
    pub fallback_model: Option<String>,
    pub attempts_per_backend: u32,
    pub backoff_ms: u64,
    pub timeout_ms: u64,
    pub api_key_env: String,
    pub base_url: String,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            primary_model: "gemini-2.5-flash".into(),
            fallback_model: Some("gemini-1.5-flash-latest".into()),
            attempts_per_backend: 2,
            backoff_ms: 1_500,
            timeout_ms: 60_000,
            api_key_env: "GEMINI_API_KEY".into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".into(),
        }
    }
}

impl ReliaConfig {
    /// Environment overrides, applied after the file.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|k| std::env::var(k).ok());
    }

    pub fn apply_env_from(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("RELIA_DB") {
            if !v.trim().is_empty() {
                self.store.path = PathBuf::from(v);
            }
        }
        if let Some(n) = get("RELIA_GLOBAL_DAILY_LIMIT").and_then(|v| v.trim().parse().ok()) {
            self.quota.global_daily = n;
        }
        if let Some(n) = get("RELIA_USER_DAILY_LIMIT").and_then(|v| v.trim().parse().ok()) {
            self.quota.per_caller_daily = n;
        }
        if let Some(n) = get("RELIA_CACHE_MAX_DAYS").and_then(|v| v.trim().parse().ok()) {
            self.cache.freshness_days = n;
        }
        if let Some(n) = get("RELIA_STORE_TIMEOUT_MS").and_then(|v| v.trim().parse().ok()) {
            self.store.timeout_ms = n;
        }
        if let Some(v) = get("RELIA_LOG") {
            self.log_level = Some(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != SUPPORTED_CONFIG_VERSION {
            return Err(ConfigError(format!(
                "unsupported config version {} (supported: {})",
                self.version, SUPPORTED_CONFIG_VERSION
            )));
        }
        let c = &self.cache;
        for (name, v) in [
            ("cache.strict_threshold", c.strict_threshold),
            ("cache.loose_threshold", c.loose_threshold),
            ("cache.mileage_threshold", c.mileage_threshold),
        ] {
            if !(v > 0.0 && v <= 1.0) {
                return Err(ConfigError(format!("{} must be in (0, 1], got {}", name, v)));
            }
        }
        if c.loose_threshold > c.strict_threshold {
            return Err(ConfigError(
                "cache.loose_threshold must not exceed cache.strict_threshold".into(),
            ));
        }
        if c.freshness_days <= 0 {
            return Err(ConfigError("cache.freshness_days must be positive".into()));
        }
        if c.freshness_days > MAX_FRESHNESS_DAYS {
            return Err(ConfigError(format!(
                "cache.freshness_days must be at most {}, got {}",
                MAX_FRESHNESS_DAYS, c.freshness_days
            )));
        }
        if self.analysis.attempts_per_backend == 0 {
            return Err(ConfigError("analysis.attempts_per_backend must be at least 1".into()));
        }
        if self.analysis.primary_model.trim().is_empty() {
            return Err(ConfigError("analysis.primary_model is required".into()));
        }
        Ok(())
    }
}

/// Parses a config file, reporting keys the schema does not know.
///
/// Unknown keys are an error when `strict`, a warning otherwise. Keys
/// starting with `_` or `x-` are extension points and always allowed.
pub fn load_config(path: &Path, strict: bool) -> Result<ReliaConfig, ConfigError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("failed to read config {}: {}", path.display(), e)))?;

    let mut ignored_keys = HashSet::new();
    let deserializer = serde_yaml::Deserializer::from_str(&raw);
    let cfg: ReliaConfig = serde_ignored::deserialize(deserializer, |p| {
        ignored_keys.insert(p.to_string());
    })
    .map_err(|e| ConfigError(format!("failed to parse YAML {}: {}", path.display(), e)))?;

    let mut unknown: Vec<_> = ignored_keys
        .into_iter()
        .filter(|k| !k.starts_with('_') && !k.starts_with("x-"))
        .collect();
    unknown.sort();

    if !unknown.is_empty() {
        if strict {
            return Err(ConfigError(format!(
                "unknown config fields: {:?} (file: {})",
                unknown,
                path.display()
            )));
        }
        tracing::warn!(event = "config_unknown_fields", fields = ?unknown, file = %path.display());
    }

    cfg.validate()?;
    Ok(cfg)
}

/// File if present, defaults otherwise; environment applied either way.
pub fn resolve(path: Option<&Path>, strict: bool) -> Result<ReliaConfig, ConfigError> {
    let mut cfg = match path {
        Some(p) => load_config(p, strict)?,
        None => {
            let default = Path::new(DEFAULT_CONFIG_FILE);
            if default.exists() {
                load_config(default, strict)?
            } else {
                ReliaConfig::default()
            }
        }
    };
    cfg.apply_env();
    cfg.validate()?;
    Ok(cfg)
}

pub fn write_sample_config(path: &Path) -> Result<(), ConfigError> {
    std::fs::write(
        path,
        r#"configVersion: 1
store:
  path: .relia/evaluations.db
  timeout_ms: 5000
cache:
  freshness_days: 45
  strict_threshold: 0.97
  loose_threshold: 0.93
  mileage_threshold: 0.92
  aggregate_min_hits: 3
  normalize: lenient
quota:
  global_daily: 1000
  per_caller_daily: 5
  on_store_error: block
analysis:
  provider: gemini
  primary_model: gemini-2.5-flash
  fallback_model: gemini-1.5-flash-latest
  attempts_per_backend: 2
  backoff_ms: 1500
  timeout_ms: 60000
  api_key_env: GEMINI_API_KEY
"#,
    )
    .map_err(|e| ConfigError(format!("failed to write {}: {}", path.display(), e)))
}

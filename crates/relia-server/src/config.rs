use std::env;
use std::path::PathBuf;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Per tool call; an analysis still running at the deadline is cancelled.
    pub timeout_ms: u64,
    pub max_msg_bytes: usize,
    pub max_field_bytes: usize,
    pub config_path: Option<PathBuf>,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 180_000,
            max_msg_bytes: 64_000,
            max_field_bytes: 256,
            config_path: None,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(n) = get("RELIA_SERVER_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            cfg.timeout_ms = n;
        }
        if let Some(n) = get("RELIA_SERVER_MAX_BYTES").and_then(|v| v.parse().ok()) {
            cfg.max_msg_bytes = n;
        }
        if let Some(n) = get("RELIA_SERVER_MAX_FIELD_BYTES").and_then(|v| v.parse().ok()) {
            cfg.max_field_bytes = n;
        }
        if let Some(v) = get("RELIA_CONFIG") {
            if !v.trim().is_empty() {
                cfg.config_path = Some(PathBuf::from(v));
            }
        }
        if let Some(v) = get("RELIA_LOG") {
            cfg.log_level = v;
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_defaults() {
        let cfg = ServerConfig::from_lookup(|k| match k {
            "RELIA_SERVER_TIMEOUT_MS" => Some("2500".into()),
            "RELIA_SERVER_MAX_BYTES" => Some("not a number".into()),
            "RELIA_CONFIG" => Some("/etc/relia.yaml".into()),
            _ => None,
        });
        assert_eq!(cfg.timeout_ms, 2500);
        assert_eq!(cfg.max_msg_bytes, ServerConfig::default().max_msg_bytes);
        assert_eq!(cfg.config_path, Some(PathBuf::from("/etc/relia.yaml")));
        assert_eq!(cfg.log_level, "info");
    }
}

//! Fail-open / fail-closed policy for store failures on the quota path.

use serde::{Deserialize, Serialize};

/// What a quota check does when the store cannot be read and no same-day
/// snapshot exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Fail-closed: deny the request (default).
    #[default]
    Block,

    /// Fail-open: let the request through uncounted.
    Allow,
}

impl FailurePolicy {
    pub fn blocks_on_error(&self) -> bool {
        matches!(self, FailurePolicy::Block)
    }

    pub fn allows_on_error(&self) -> bool {
        matches!(self, FailurePolicy::Allow)
    }
}

/// Structured audit event for every fail-open decision.
pub fn log_fail_safe(reason: &str, component: &str) {
    tracing::warn!(
        event = "relia.failsafe.triggered",
        reason = %reason,
        component = %component,
        action = "allowed",
        "Fail-safe triggered: {}", reason
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_block() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::Block);
        assert!(FailurePolicy::Block.blocks_on_error());
        assert!(!FailurePolicy::Block.allows_on_error());
    }

    #[test]
    fn parses_from_yaml() {
        let p: FailurePolicy = serde_yaml::from_str("allow").unwrap();
        assert!(p.allows_on_error());
    }
}

use relia_core::{EngineError, ReliabilityService};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;

pub struct ToolContext {
    pub service: Arc<ReliabilityService>,
    pub cfg: ServerConfig,
}

#[derive(serde::Serialize)]
pub struct ToolError {
    pub code: String,
    pub message: String,
}

impl ToolError {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    pub fn result(self) -> anyhow::Result<Value> {
        Ok(serde_json::json!({ "error": self }))
    }
}

impl From<&EngineError> for ToolError {
    fn from(e: &EngineError) -> Self {
        Self::new(e.code(), &e.to_string())
    }
}

pub mod analyze;
pub mod history;
pub mod quota;

/// `caller` argument; absent or blank means anonymous.
pub(crate) fn caller(args: &Value) -> &str {
    args.get("caller").and_then(Value::as_str).unwrap_or("")
}

/// First string argument longer than the configured limit.
pub(crate) fn oversized_field<'a>(args: &'a Value, max: usize) -> Option<&'a str> {
    args.as_object()?
        .iter()
        .find(|(_, v)| v.as_str().is_some_and(|s| s.len() > max))
        .map(|(k, _)| k.as_str())
}

pub fn list_tools() -> Vec<Value> {
    vec![
        serde_json::json!({
            "name": "relia_analyze",
            "description": "Reliability evaluation for a vehicle: cached when a fresh match exists, otherwise a new analysis.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "caller": { "type": "string" },
                    "make": { "type": "string" },
                    "model": { "type": "string" },
                    "sub_model": { "type": "string" },
                    "year": { "type": "integer" },
                    "fuel": { "type": "string" },
                    "transmission": { "type": "string" },
                    "mileage_range": { "type": "string" }
                },
                "required": ["make", "model", "year", "mileage_range"]
            }
        }),
        serde_json::json!({
            "name": "relia_quota",
            "description": "Requests left today for the caller and globally.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "caller": { "type": "string" }
                }
            }
        }),
        serde_json::json!({
            "name": "relia_history",
            "description": "The caller's past evaluations, newest first, or all of them as CSV.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "caller": { "type": "string" },
                    "limit": { "type": "integer", "minimum": 1 },
                    "offset": { "type": "integer", "minimum": 0 },
                    "format": { "type": "string", "enum": ["json", "csv"] }
                },
                "required": ["caller"]
            }
        }),
    ]
}

pub async fn handle_call(
    ctx: &ToolContext,
    name: &str,
    args: &Value,
    cancel: &CancellationToken,
) -> anyhow::Result<Value> {
    if let Some(field) = oversized_field(args, ctx.cfg.max_field_bytes) {
        return ToolError::new("E_LIMIT_EXCEEDED", &format!("argument '{}' too long", field))
            .result();
    }
    match name {
        "relia_analyze" => analyze::analyze(ctx, args, cancel).await,
        "relia_quota" => quota::quota(ctx, args).await,
        "relia_history" => history::history(ctx, args).await,
        _ => Err(anyhow::anyhow!("Unknown tool: {}", name)),
    }
}

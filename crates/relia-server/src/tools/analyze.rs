use super::{caller, ToolContext, ToolError};
use anyhow::Result;
use relia_core::AnalyzeRequest;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub async fn analyze(ctx: &ToolContext, args: &Value, cancel: &CancellationToken) -> Result<Value> {
    let req: AnalyzeRequest = match serde_json::from_value(args.clone()) {
        Ok(r) => r,
        Err(e) => return ToolError::new("E_INVALID_REQUEST", &e.to_string()).result(),
    };

    match ctx.service.analyze(caller(args), &req, cancel).await {
        Ok(resp) => Ok(serde_json::to_value(resp)?),
        Err(e) => ToolError::from(&e).result(),
    }
}

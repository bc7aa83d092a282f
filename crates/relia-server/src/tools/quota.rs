use super::{caller, ToolContext, ToolError};
use anyhow::Result;
use serde_json::Value;

pub async fn quota(ctx: &ToolContext, args: &Value) -> Result<Value> {
    match ctx.service.remaining_quota(caller(args)).await {
        Ok(left) => Ok(serde_json::to_value(left)?),
        Err(e) => ToolError::from(&e).result(),
    }
}

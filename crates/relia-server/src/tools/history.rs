use super::{caller, ToolContext, ToolError};
use anyhow::Result;
use serde_json::Value;

const DEFAULT_LIMIT: usize = 20;

pub async fn history(ctx: &ToolContext, args: &Value) -> Result<Value> {
    let limit = args
        .get("limit")
        .and_then(Value::as_u64)
        .map_or(DEFAULT_LIMIT, |n| n as usize);
    let offset = args.get("offset").and_then(Value::as_u64).unwrap_or(0) as usize;
    let format = args.get("format").and_then(Value::as_str).unwrap_or("json");

    let result = match format {
        "csv" => ctx
            .service
            .export_history_csv(caller(args))
            .await
            .map(|csv| serde_json::json!({ "csv": csv })),
        "json" => match ctx.service.history(caller(args), limit, offset).await {
            Ok(page) => Ok(serde_json::to_value(page)?),
            Err(e) => Err(e),
        },
        other => {
            return ToolError::new("E_INVALID_REQUEST", &format!("unknown format '{}'", other))
                .result()
        }
    };

    match result {
        Ok(v) => Ok(v),
        Err(e) => ToolError::from(&e).result(),
    }
}

use crate::tools::{self, ToolContext};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

static RID: AtomicU64 = AtomicU64::new(1);

fn next_rid() -> String {
    let n = RID.fetch_add(1, Ordering::Relaxed);
    format!("r-{n:06}")
}

#[derive(Debug, Serialize, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Option<Value>,
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    id: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

impl JsonRpcResponse {
    fn ok(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError { code, message }),
            id,
        }
    }
}

/// Wraps a tool payload as `{content: [{type: "text", text}], isError}`.
fn call_result(payload: &Value) -> Value {
    let is_error = payload.get("error").is_some();
    let text = serde_json::to_string_pretty(payload).unwrap_or_default();
    serde_json::json!({
        "content": [{ "type": "text", "text": text }],
        "isError": is_error
    })
}

pub struct Server;

impl Server {
    pub async fn run(ctx: ToolContext) -> Result<()> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        Self::serve(&ctx, stdin.lock(), stdout.lock()).await
    }

    /// One response line per request line, until `input` is exhausted.
    pub async fn serve<R: BufRead, W: Write>(ctx: &ToolContext, input: R, mut output: W) -> Result<()> {
        for line in input.lines() {
            let line = line?;
            let rid = next_rid();

            if line.len() > ctx.cfg.max_msg_bytes {
                tracing::warn!(
                    event = "limit_exceeded",
                    rid = %rid,
                    bytes_in = line.len(),
                    max = ctx.cfg.max_msg_bytes
                );
                let payload = serde_json::json!({
                    "error": {
                        "code": "E_LIMIT_EXCEEDED",
                        "message": format!("message bytes={} > max={}", line.len(), ctx.cfg.max_msg_bytes)
                    }
                });
                writeln!(output, "{}", serde_json::to_string(&JsonRpcResponse::ok(None, call_result(&payload)))?)?;
                output.flush()?;
                continue;
            }

            if line.trim().is_empty() {
                continue;
            }

            let req: JsonRpcRequest = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!(event = "json_parse_error", rid = %rid, error = %e);
                    continue;
                }
            };

            let resp = match req.method.as_str() {
                "initialize" => JsonRpcResponse::ok(
                    req.id.clone(),
                    serde_json::json!({
                        "protocolVersion": "2024-11-05",
                        "capabilities": { "tools": {} },
                        "serverInfo": {
                            "name": "relia-server",
                            "version": env!("CARGO_PKG_VERSION")
                        }
                    }),
                ),
                "notifications/initialized" => {
                    tracing::info!(event = "initialized", rid = %rid);
                    continue;
                }
                "tools/list" => JsonRpcResponse::ok(
                    req.id.clone(),
                    serde_json::json!({ "tools": tools::list_tools() }),
                ),
                "tools/call" => match req.params.as_ref() {
                    Some(params) => {
                        let result = call_tool(ctx, &rid, params).await;
                        JsonRpcResponse::ok(req.id.clone(), result)
                    }
                    None => JsonRpcResponse::error(req.id.clone(), -32602, "Missing params".to_string()),
                },
                _ => JsonRpcResponse::error(
                    req.id.clone(),
                    -32601,
                    format!("Method not found: {}", req.method),
                ),
            };

            writeln!(output, "{}", serde_json::to_string(&resp)?)?;
            output.flush()?;
        }

        Ok(())
    }
}

async fn call_tool(ctx: &ToolContext, rid: &str, params: &Value) -> Value {
    let name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let default_args = serde_json::json!({});
    let args = params.get("arguments").unwrap_or(&default_args);
    let caller = tools::caller(args);

    let start = std::time::Instant::now();
    tracing::info!(event = "tool_call_start", rid = %rid, tool = name, caller = caller);

    let cancel = CancellationToken::new();
    let call = tools::handle_call(ctx, name, args, &cancel);
    tokio::pin!(call);
    let deadline = Duration::from_millis(ctx.cfg.timeout_ms);
    let result = match timeout(deadline, &mut call).await {
        Ok(res) => res,
        Err(_) => {
            // Let the call observe the cancellation so nothing is persisted
            // after the deadline. Store access is itself time-bounded.
            cancel.cancel();
            match call.await {
                // Work that completed anyway (and may have been persisted)
                // is reported rather than masked as a timeout.
                Ok(val) if val.get("error").is_none() => {
                    tracing::warn!(
                        event = "tool_call_late_success",
                        rid = %rid,
                        tool = name,
                        duration_ms = start.elapsed().as_millis() as u64
                    );
                    Ok(val)
                }
                _ => {
                    tracing::warn!(
                        event = "tool_call_timeout",
                        rid = %rid,
                        tool = name,
                        duration_ms = start.elapsed().as_millis() as u64,
                        code = "E_TIMEOUT"
                    );
                    Ok(serde_json::json!({
                        "error": {
                            "code": "E_TIMEOUT",
                            "message": format!("Request exceeded {}ms", ctx.cfg.timeout_ms)
                        }
                    }))
                }
            }
        }
    };

    let dur = start.elapsed().as_millis() as u64;
    let payload = match result {
        Ok(val) => {
            match val.pointer("/error/code").and_then(Value::as_str) {
                Some(code) => tracing::info!(
                    event = "tool_call_done",
                    rid = %rid,
                    tool = name,
                    duration_ms = dur,
                    outcome = "app_error",
                    code = code
                ),
                None => tracing::info!(
                    event = "tool_call_done",
                    rid = %rid,
                    tool = name,
                    duration_ms = dur,
                    outcome = "ok"
                ),
            }
            val
        }
        Err(e) => {
            tracing::error!(event = "tool_call_crash", rid = %rid, tool = name, duration_ms = dur, error = %e);
            serde_json::json!({
                "error": { "code": "E_INTERNAL", "message": e.to_string() }
            })
        }
    };
    call_result(&payload)
}

use relia_core::clock::SystemClock;
use relia_core::config::{ProviderKind, ReliaConfig};
use relia_core::providers::llm::fake::{FakeAnalysisClient, FakeReply};
use relia_core::storage::MemoryStore;
use relia_core::ReliabilityService;
use relia_server::config::ServerConfig;
use relia_server::server::Server;
use relia_server::tools::ToolContext;
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Arc;

fn context(client: FakeAnalysisClient, cfg: ServerConfig) -> (ToolContext, Arc<MemoryStore>) {
    let mut relia_cfg = ReliaConfig::default();
    relia_cfg.analysis.provider = ProviderKind::Fake;
    relia_cfg.analysis.backoff_ms = 0;
    relia_cfg.quota.per_caller_daily = 2;
    relia_cfg.store.timeout_ms = 500;

    let store = Arc::new(MemoryStore::new());
    let service = ReliabilityService::new(
        &relia_cfg,
        store.clone(),
        Arc::new(client),
        Arc::new(SystemClock),
    );
    (
        ToolContext {
            service: Arc::new(service),
            cfg,
        },
        store,
    )
}

async fn exchange(ctx: &ToolContext, requests: &[Value]) -> Vec<Value> {
    let input: String = requests.iter().map(|r| format!("{}\n", r)).collect();
    let mut out = Vec::new();
    Server::serve(ctx, Cursor::new(input), &mut out).await.unwrap();
    String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

fn call(id: u64, tool: &str, args: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "tools/call",
        "params": { "name": tool, "arguments": args },
        "id": id
    })
}

fn inner(resp: &Value) -> Value {
    let text = resp["result"]["content"][0]["text"].as_str().expect("text content");
    serde_json::from_str(text).expect("inner json")
}

fn corolla(caller: &str) -> Value {
    json!({
        "caller": caller,
        "make": "Toyota",
        "model": "Corolla",
        "year": 2018,
        "fuel": "gasoline",
        "transmission": "automatic",
        "mileage_range": "50,000-100,000"
    })
}

#[tokio::test]
async fn initialize_and_list_tools() {
    let (ctx, _) = context(FakeAnalysisClient::default(), ServerConfig::default());
    let resps = exchange(
        &ctx,
        &[
            json!({"jsonrpc": "2.0", "method": "initialize", "params": {}, "id": 1}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "method": "tools/list", "params": {}, "id": 2}),
            json!({"jsonrpc": "2.0", "method": "resources/list", "id": 3}),
        ],
    )
    .await;

    assert_eq!(resps.len(), 3);
    assert_eq!(resps[0]["result"]["serverInfo"]["name"], "relia-server");
    let tools = resps[1]["result"]["tools"].as_array().unwrap();
    for name in ["relia_analyze", "relia_quota", "relia_history"] {
        assert!(tools.iter().any(|t| t["name"] == name), "missing {}", name);
    }
    assert_eq!(resps[2]["error"]["code"], -32601);
}

#[tokio::test]
async fn analyze_then_cache_then_quota_and_history() {
    let (ctx, store) = context(FakeAnalysisClient::default(), ServerConfig::default());
    let resps = exchange(
        &ctx,
        &[
            call(1, "relia_analyze", corolla("u1")),
            call(2, "relia_analyze", corolla("u1")),
            call(3, "relia_quota", json!({"caller": "u1"})),
            call(4, "relia_history", json!({"caller": "u1"})),
            call(5, "relia_history", json!({"caller": "u1", "format": "csv"})),
        ],
    )
    .await;

    let first = inner(&resps[0]);
    assert_eq!(resps[0]["result"]["isError"], false);
    assert_eq!(first["source"], "model");
    assert_eq!(first["result"]["score"], 72);
    assert_eq!(first["quota"]["user_left"], 1);

    let second = inner(&resps[1]);
    assert_eq!(second["source"], "cache");
    assert_eq!(second["quota"]["user_left"], 1);
    assert_eq!(store.append_count(), 1);

    let quota = inner(&resps[2]);
    assert_eq!(quota["user_left"], 1);
    assert_eq!(quota["global_left"], 999);

    let history = inner(&resps[3]);
    assert_eq!(history["total"], 1);
    assert_eq!(history["items"][0]["model"], "Corolla");

    let csv = inner(&resps[4]);
    assert!(csv["csv"].as_str().unwrap().starts_with("date,user_id"));
}

#[tokio::test]
async fn quota_denial_is_a_tool_error() {
    let (ctx, store) = context(FakeAnalysisClient::default(), ServerConfig::default());
    let mut second = corolla("u1");
    second["year"] = json!(2019);
    let mut third = corolla("u1");
    third["year"] = json!(2020);

    let resps = exchange(
        &ctx,
        &[
            call(1, "relia_analyze", corolla("u1")),
            call(2, "relia_analyze", second),
            call(3, "relia_analyze", third),
        ],
    )
    .await;

    assert_eq!(resps[2]["result"]["isError"], true);
    assert_eq!(inner(&resps[2])["error"]["code"], "E_QUOTA_EXCEEDED");
    assert_eq!(store.append_count(), 2);
}

#[tokio::test]
async fn bad_arguments_and_limits() {
    let cfg = ServerConfig {
        max_msg_bytes: 2_000,
        max_field_bytes: 32,
        ..ServerConfig::default()
    };
    let (ctx, _) = context(FakeAnalysisClient::default(), cfg);
    let mut long_make = corolla("u1");
    long_make["make"] = json!("x".repeat(64));

    let huge = call(4, "relia_quota", json!({"caller": "y".repeat(5_000)}));
    let input = format!(
        "not json at all\n{}\n{}\n{}\n{}\n",
        call(1, "relia_analyze", json!({"make": "Toyota"})),
        call(2, "relia_analyze", long_make),
        call(3, "relia_unknown", json!({})),
        huge
    );
    let mut out = Vec::new();
    Server::serve(&ctx, Cursor::new(input), &mut out).await.unwrap();
    let resps: Vec<Value> = String::from_utf8(out)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(resps.len(), 4);
    assert_eq!(inner(&resps[0])["error"]["code"], "E_INVALID_REQUEST");
    assert_eq!(inner(&resps[1])["error"]["code"], "E_LIMIT_EXCEEDED");
    assert_eq!(inner(&resps[2])["error"]["code"], "E_INTERNAL");
    assert_eq!(inner(&resps[3])["error"]["code"], "E_LIMIT_EXCEEDED");
}

#[tokio::test]
async fn timeout_cancels_analysis_without_persisting() {
    let cfg = ServerConfig {
        timeout_ms: 50,
        ..ServerConfig::default()
    };
    let client = FakeAnalysisClient::scripted(vec![FakeReply::Hang]);
    let (ctx, store) = context(client, cfg);

    let resps = exchange(&ctx, &[call(1, "relia_analyze", corolla("u1"))]).await;

    assert_eq!(resps[0]["result"]["isError"], true);
    assert_eq!(inner(&resps[0])["error"]["code"], "E_TIMEOUT");
    assert_eq!(store.append_count(), 0);
}

#[tokio::test]
async fn work_finishing_after_the_deadline_is_reported() {
    let cfg = ServerConfig {
        timeout_ms: 20,
        ..ServerConfig::default()
    };
    let (ctx, store) = context(FakeAnalysisClient::default(), cfg);
    store.set_read_delay(Some(std::time::Duration::from_millis(100)));

    let resps = exchange(&ctx, &[call(1, "relia_quota", json!({"caller": "u1"}))]).await;

    assert_eq!(resps[0]["result"]["isError"], false);
    let quota = inner(&resps[0]);
    assert_eq!(quota["user_left"], 2);
    assert_eq!(quota["global_left"], 1000);
}

use anyhow::Result;
use clap::Parser;
use relia_core::clock::SystemClock;
use relia_core::config;
use relia_core::providers::build_client;
use relia_core::storage::SqliteStore;
use relia_core::ReliabilityService;
use relia_server::config::ServerConfig;
use relia_server::server::Server;
use relia_server::tools::ToolContext;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relia config file (defaults to RELIA_CONFIG, then ./relia.yaml)
    #[arg(long)]
    config: Option<PathBuf>,
}

use tracing_subscriber::{fmt, EnvFilter};

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_target(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut cfg = ServerConfig::from_env();
    if args.config.is_some() {
        cfg.config_path = args.config;
    }

    init_logging(&cfg.log_level);

    let relia_cfg = config::resolve(cfg.config_path.as_deref(), false)
        .map_err(|e| anyhow::anyhow!("config error: {}", e))?;
    let store = SqliteStore::open(&relia_cfg.store.path)?;
    store.init_schema()?;
    store.set_busy_timeout(relia_cfg.store.timeout())?;
    let client = build_client(&relia_cfg.analysis)?;
    let service = ReliabilityService::new(&relia_cfg, Arc::new(store), client, Arc::new(SystemClock));

    tracing::info!(
        event = "server_start",
        store = %relia_cfg.store.path.display(),
        config = ?cfg
    );

    let ctx = ToolContext {
        service: Arc::new(service),
        cfg,
    };
    Server::run(ctx).await
}

pub mod analyze;
pub mod doctor;
pub mod history;
pub mod init;
pub mod quota;

use crate::cli::args::{Cli, Command, ConfigArgs};
use anyhow::Context;
use relia_core::config::{self, ReliaConfig};
use relia_core::storage::SqliteStore;
use relia_core::EngineError;
use std::sync::Arc;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const REQUEST_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const QUOTA_EXCEEDED: i32 = 3;
    pub const INVALID_REQUEST: i32 = 4;
    pub const CANCELLED: i32 = 130;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(args) => init::run(args).await,
        Command::Analyze(args) => analyze::run(args).await,
        Command::Quota(args) => quota::run(args).await,
        Command::History(args) => history::run(args).await,
        Command::Doctor(args) => doctor::run(args).await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

pub(crate) fn load(common: &ConfigArgs) -> anyhow::Result<ReliaConfig> {
    let mut cfg = config::resolve(common.config.as_deref(), common.strict_config)
        .map_err(|e| anyhow::anyhow!("config error: {}", e))?;
    if let Some(db) = &common.db {
        cfg.store.path = db.clone();
    }
    Ok(cfg)
}

pub(crate) fn open_store(cfg: &ReliaConfig) -> anyhow::Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&cfg.store.path)
        .with_context(|| format!("failed to open store {}", cfg.store.path.display()))?;
    store.init_schema().context("failed to initialise store schema")?;
    store.set_busy_timeout(cfg.store.timeout())?;
    Ok(Arc::new(store))
}

/// Prints a request failure and picks its exit code.
pub(crate) fn report_engine_error(e: &EngineError) -> i32 {
    eprintln!("error [{}]: {}", e.code(), e);
    match e {
        EngineError::QuotaExceeded { .. } => exit_codes::QUOTA_EXCEEDED,
        EngineError::InvalidRequest(_) => exit_codes::INVALID_REQUEST,
        EngineError::Cancelled => exit_codes::CANCELLED,
        _ => exit_codes::REQUEST_FAILED,
    }
}

pub(crate) fn write_output(out: Option<&std::path::Path>, rendered: &str) -> anyhow::Result<()> {
    match out {
        Some(p) => {
            std::fs::write(p, rendered)
                .with_context(|| format!("failed to write {}", p.display()))?;
            eprintln!("wrote file: {}", p.display());
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

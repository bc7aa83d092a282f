use super::{exit_codes, open_store};
use crate::cli::args::InitArgs;
use relia_core::config::{load_config, write_sample_config};

pub async fn run(args: InitArgs) -> anyhow::Result<i32> {
    if args.config.exists() && !args.force {
        eprintln!(
            "config exists, keeping it: {} (use --force to overwrite)",
            args.config.display()
        );
    } else {
        write_sample_config(&args.config).map_err(|e| anyhow::anyhow!("{}", e))?;
        eprintln!("wrote config: {}", args.config.display());
    }

    let mut cfg = load_config(&args.config, false)
        .map_err(|e| anyhow::anyhow!("config error: {}", e))?;
    cfg.apply_env();
    if let Some(db) = args.db {
        cfg.store.path = db;
    }

    open_store(&cfg)?;
    eprintln!("store ready: {}", cfg.store.path.display());
    Ok(exit_codes::OK)
}

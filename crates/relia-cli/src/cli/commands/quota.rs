use super::{exit_codes, load, open_store, report_engine_error};
use crate::cli::args::QuotaArgs;
use relia_core::clock::SystemClock;
use relia_core::quota::{QuotaLimits, QuotaTracker};
use std::sync::Arc;

pub async fn run(args: QuotaArgs) -> anyhow::Result<i32> {
    let cfg = load(&args.common)?;
    let store = open_store(&cfg)?;

    let tracker = QuotaTracker::new(
        store,
        Arc::new(SystemClock),
        QuotaLimits {
            global_daily: cfg.quota.global_daily,
            per_caller_daily: cfg.quota.per_caller_daily,
        },
        cfg.store.timeout(),
        cfg.quota.on_store_error,
    );

    let status = match tracker.check(args.caller.trim()).await {
        Ok(s) => s,
        Err(e) => return Ok(report_engine_error(&e)),
    };
    let left = status.remaining(0);

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&left)?);
    } else {
        match left.user_left {
            Some(n) => println!("user_left:   {}", n),
            None => println!("user_left:   unlimited"),
        }
        println!("global_left: {}", left.global_left);
        if status.stale {
            eprintln!("warning: store unreadable, counts are from an earlier read");
        }
    }
    Ok(exit_codes::OK)
}

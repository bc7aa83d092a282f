use super::{exit_codes, load, open_store, report_engine_error};
use crate::cli::args::AnalyzeArgs;
use relia_core::clock::SystemClock;
use relia_core::model::{AnalyzeRequest, AnalyzeResponse, ResultSource};
use relia_core::providers::build_client;
use relia_core::ReliabilityService;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub async fn run(args: AnalyzeArgs) -> anyhow::Result<i32> {
    let cfg = load(&args.common)?;
    let store = open_store(&cfg)?;
    let client = build_client(&cfg.analysis).map_err(|e| anyhow::anyhow!("{}", e))?;
    let service = ReliabilityService::new(&cfg, store, client, Arc::new(SystemClock));

    let req = AnalyzeRequest {
        make: args.make,
        model: args.model,
        sub_model: args.sub_model,
        year: args.year,
        fuel: args.fuel,
        transmission: args.transmission,
        mileage_bucket: args.mileage,
    };

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    let timeout = args.timeout_secs.map(Duration::from_secs);
    tokio::spawn(async move {
        let interrupted = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        match timeout {
            Some(t) => {
                tokio::select! {
                    _ = interrupted => {}
                    _ = tokio::time::sleep(t) => {}
                }
            }
            None => interrupted.await,
        }
        watcher.cancel();
    });

    let resp = match service.analyze(&args.caller, &req, &cancel).await {
        Ok(r) => r,
        Err(e) => return Ok(report_engine_error(&e)),
    };

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&resp)?);
    } else {
        print!("{}", render(&resp));
    }
    for w in &resp.warnings {
        eprintln!("warning: {}", w);
    }
    Ok(exit_codes::OK)
}

fn render(resp: &AnalyzeResponse) -> String {
    let r = &resp.result;
    let mut s = String::new();
    let _ = write!(s, "{} {}", r.make, r.model);
    if !r.sub_model.is_empty() {
        let _ = write!(s, " {}", r.sub_model);
    }
    let _ = writeln!(s, " ({})", r.year);

    let source = match resp.source {
        ResultSource::Cache if resp.is_aggregate => format!("cache (aggregate of {})", resp.count),
        ResultSource::Cache => "cache".to_string(),
        ResultSource::Model => "model".to_string(),
    };
    let _ = writeln!(s, "source: {}", source);
    match r.score {
        Some(score) => {
            let _ = writeln!(s, "score: {}", score);
        }
        None => {
            let _ = writeln!(s, "score: -");
        }
    }
    if resp.score_adjustment != 0 {
        let _ = writeln!(s, "adjustment: {}", resp.score_adjustment);
    }
    if let Some(note) = &resp.mileage_note {
        let _ = writeln!(s, "mileage: {}", note);
    }
    if let Some(cost) = r.avg_repair_cost {
        let _ = writeln!(s, "avg repair cost: {}", cost);
    }
    if !r.summary.is_empty() {
        let _ = writeln!(s, "\n{}\n", r.summary);
    }
    for issue in &r.issues {
        let _ = writeln!(s, "- {}", issue);
    }
    let user_left = resp
        .quota
        .user_left
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unlimited".into());
    let _ = writeln!(
        s,
        "quota: {} left for you, {} left today",
        user_left, resp.quota.global_left
    );
    s
}

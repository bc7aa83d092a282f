pub mod model;

use chrono::Utc;
use std::fmt::Write as _;

use crate::clock::Clock;
use crate::config::{ProviderKind, ReliaConfig};
use crate::engine::RetryPolicy;
use crate::quota::tally;
use crate::storage::{read_all_within, RecordStore};

use model::*;

/// Best-effort diagnostics; never fails, problems end up in the report.
pub async fn doctor(
    cfg: &ReliaConfig,
    store: &dyn RecordStore,
    clock: &dyn Clock,
    key_lookup: impl Fn(&str) -> Option<String>,
) -> DoctorReport {
    let mut notes = vec![];
    let mut actions = vec![];

    let store_summary = summarize_store(cfg, store, clock, &mut notes).await;
    if !store_summary.reachable {
        actions.push(SuggestedAction {
            title: "Initialise the store".into(),
            why: format!(
                "{} could not be read: {}",
                store_summary.location,
                store_summary.error.as_deref().unwrap_or("unknown error")
            ),
            steps: vec!["relia init".into()],
        });
    } else if !store_summary.missing_columns.is_empty() {
        actions.push(SuggestedAction {
            title: "Migrate legacy columns".into(),
            why: format!("missing columns: {}", store_summary.missing_columns.join(", ")),
            steps: vec!["relia init".into()],
        });
    }

    let analysis = summarize_analysis(cfg, &key_lookup);
    if cfg.analysis.provider == ProviderKind::Gemini && !analysis.api_key_present {
        actions.push(SuggestedAction {
            title: "Set the analysis API key".into(),
            why: "cache misses will fail without a key".into(),
            steps: vec![format!("export {}=...", cfg.analysis.api_key_env)],
        });
    }

    let global_left = store_summary
        .rows_today
        .map(|used| cfg.quota.global_daily.saturating_sub(used));
    if global_left == Some(0) {
        notes.push("global daily limit reached; new analyses are blocked until tomorrow".into());
    }

    DoctorReport {
        schema_version: 1,
        generated_at: Utc::now().to_rfc3339(),
        relia_version: env!("CARGO_PKG_VERSION").to_string(),
        platform: PlatformInfo {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        },
        store: store_summary,
        analysis,
        quota: QuotaSummary {
            global_daily: cfg.quota.global_daily,
            per_caller_daily: cfg.quota.per_caller_daily,
            global_left,
        },
        suggested_actions: actions,
        notes,
    }
}

async fn summarize_store(
    cfg: &ReliaConfig,
    store: &dyn RecordStore,
    clock: &dyn Clock,
    notes: &mut Vec<String>,
) -> StoreSummary {
    let mut summary = StoreSummary {
        location: store.describe(),
        ..Default::default()
    };

    match tokio::time::timeout(cfg.store.timeout(), store.inspect()).await {
        Ok(Ok(inspection)) => {
            summary.reachable = true;
            summary.present_columns = inspection.present_columns;
            summary.missing_columns = inspection.missing_columns;
            summary.row_count = Some(inspection.row_count);
        }
        Ok(Err(e)) => {
            summary.error = Some(e.to_string());
            return summary;
        }
        Err(_) => {
            summary.error = Some(format!("timed out after {}ms", cfg.store.timeout_ms));
            return summary;
        }
    }

    match read_all_within(store, cfg.store.timeout()).await {
        Ok(records) => {
            let now = clock.now();
            let window = chrono::Duration::days(cfg.cache.freshness_days);
            let fresh = records.iter().filter(|r| r.is_fresh(now, window)).count();
            let undated = records.iter().filter(|r| r.created_at.is_none()).count();
            summary.fresh_rows = Some(fresh as u64);
            summary.rows_today = Some(tally(&records, clock.today()).total);
            if undated > 0 {
                notes.push(format!(
                    "{} row(s) have no parseable date and are never served from cache",
                    undated
                ));
            }
        }
        Err(e) => notes.push(format!("row scan failed: {}", e)),
    }
    summary
}

fn summarize_analysis(cfg: &ReliaConfig, key_lookup: &impl Fn(&str) -> Option<String>) -> AnalysisSummary {
    let provider = match cfg.analysis.provider {
        ProviderKind::Gemini => "gemini",
        ProviderKind::Fake => "fake",
    };
    AnalysisSummary {
        provider: provider.into(),
        backends: RetryPolicy::from_settings(&cfg.analysis).backends().to_vec(),
        api_key_env: cfg.analysis.api_key_env.clone(),
        api_key_present: key_lookup(&cfg.analysis.api_key_env)
            .is_some_and(|k| !k.trim().is_empty()),
    }
}

/// Human-readable rendering for the terminal.
pub fn render_text(r: &DoctorReport) -> String {
    let mut out = String::new();
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let opt = |v: Option<u64>| v.map(|n| n.to_string()).unwrap_or_else(|| "-".into());

    let _ = writeln!(out, "relia {} ({}/{})", r.relia_version, r.platform.os, r.platform.arch);
    let _ = writeln!(out, "\nStore: {}", r.store.location);
    let _ = writeln!(out, "  reachable:        {}", yes_no(r.store.reachable));
    if let Some(e) = &r.store.error {
        let _ = writeln!(out, "  error:            {}", e);
    }
    let _ = writeln!(out, "  rows:             {}", opt(r.store.row_count));
    let _ = writeln!(out, "  fresh rows:       {}", opt(r.store.fresh_rows));
    let _ = writeln!(out, "  rows today:       {}", opt(r.store.rows_today.map(u64::from)));
    if !r.store.missing_columns.is_empty() {
        let _ = writeln!(out, "  missing columns:  {}", r.store.missing_columns.join(", "));
    }

    let _ = writeln!(out, "\nAnalysis: {}", r.analysis.provider);
    let _ = writeln!(out, "  backends:         {}", r.analysis.backends.join(" -> "));
    let _ = writeln!(
        out,
        "  {}: {}",
        r.analysis.api_key_env,
        if r.analysis.api_key_present { "set" } else { "missing" }
    );

    let _ = writeln!(out, "\nQuota");
    let _ = writeln!(out, "  global daily:     {}", r.quota.global_daily);
    let _ = writeln!(out, "  per caller daily: {}", r.quota.per_caller_daily);
    if let Some(left) = r.quota.global_left {
        let _ = writeln!(out, "  global left:      {}", left);
    }

    for n in &r.notes {
        let _ = writeln!(out, "\nnote: {}", n);
    }
    for a in &r.suggested_actions {
        let _ = writeln!(out, "\n* {}: {}", a.title, a.why);
        for s in &a.steps {
            let _ = writeln!(out, "    $ {}", s);
        }
    }
    out
}

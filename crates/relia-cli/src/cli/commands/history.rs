use super::{exit_codes, load, open_store, write_output};
use crate::cli::args::HistoryArgs;
use relia_core::history::{export_csv, is_anonymous, list_for_caller};
use relia_core::storage::read_all_within;
use std::fmt::Write as _;

pub async fn run(args: HistoryArgs) -> anyhow::Result<i32> {
    if is_anonymous(&args.caller) {
        eprintln!("history requires an identified caller (--caller)");
        return Ok(exit_codes::INVALID_REQUEST);
    }
    let caller = args.caller.trim();

    let cfg = load(&args.common)?;
    let store = open_store(&cfg)?;
    let records = match read_all_within(store.as_ref(), cfg.store.timeout()).await {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error [E_STORE_UNAVAILABLE]: {}", e);
            return Ok(exit_codes::REQUEST_FAILED);
        }
    };

    let rendered = if args.csv {
        export_csv(&records, caller)
    } else {
        let page = list_for_caller(&records, caller, args.limit, args.offset);
        if args.format == "json" {
            format!("{}\n", serde_json::to_string_pretty(&page)?)
        } else {
            let mut s = String::new();
            for item in &page.items {
                let score = item.score.map(|n| n.to_string()).unwrap_or_else(|| "-".into());
                let _ = write!(s, "{}  {} {}", item.date, item.make, item.model);
                if let Some(sub) = &item.sub_model {
                    let _ = write!(s, " {}", sub);
                }
                let _ = writeln!(s, " {}  {}  score {}", item.year, item.mileage_range, score);
            }
            let _ = writeln!(
                s,
                "{} of {} evaluation(s)",
                page.items.len(),
                page.total
            );
            s
        }
    };
    write_output(args.out.as_deref(), &rendered)?;
    Ok(exit_codes::OK)
}

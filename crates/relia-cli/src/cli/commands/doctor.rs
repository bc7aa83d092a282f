use super::{exit_codes, load, write_output};
use crate::cli::args::DoctorArgs;
use relia_core::clock::SystemClock;
use relia_core::doctor::{doctor, render_text};
use relia_core::storage::{RecordStore, SqliteStore};

pub async fn run(args: DoctorArgs) -> anyhow::Result<i32> {
    let cfg = load(&args.common)?;

    // Opening is part of the diagnosis, so no schema init here.
    let report = match SqliteStore::open(&cfg.store.path) {
        Ok(store) => {
            doctor(&cfg, &store as &dyn RecordStore, &SystemClock, |k| {
                std::env::var(k).ok()
            })
            .await
        }
        Err(e) => {
            eprintln!("store could not be opened: {}", e);
            return Ok(exit_codes::REQUEST_FAILED);
        }
    };

    let rendered = if args.format == "json" {
        format!("{}\n", serde_json::to_string_pretty(&report)?)
    } else {
        render_text(&report)
    };
    write_output(args.out.as_deref(), &rendered)?;

    if report.store.reachable {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::REQUEST_FAILED)
    }
}

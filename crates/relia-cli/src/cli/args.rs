use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "relia",
    version,
    about = "Cache-first vehicle reliability lookups with daily quotas"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a sample config and initialise the store
    Init(InitArgs),
    /// Evaluate one vehicle (cache first, model on miss)
    Analyze(AnalyzeArgs),
    /// Remaining requests today
    Quota(QuotaArgs),
    /// A caller's past evaluations
    History(HistoryArgs),
    /// Store and provider diagnostics
    Doctor(DoctorArgs),
    Version,
}

/// Options shared by every command that reads the config.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Config file; `relia.yaml` is used when present
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Overrides `store.path` (and RELIA_DB)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Reject unknown config keys
    #[arg(long)]
    pub strict_config: bool,
}

#[derive(Parser, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = "relia.yaml")]
    pub config: PathBuf,

    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Clone)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub common: ConfigArgs,

    #[arg(long, env = "RELIA_CALLER", default_value = "anonymous")]
    pub caller: String,

    #[arg(long)]
    pub make: String,

    #[arg(long)]
    pub model: String,

    #[arg(long)]
    pub sub_model: Option<String>,

    #[arg(long)]
    pub year: i32,

    #[arg(long, default_value = "")]
    pub fuel: String,

    #[arg(long, default_value = "")]
    pub transmission: String,

    /// Mileage bucket label, e.g. "100,000-150,000"
    #[arg(long, default_value = "")]
    pub mileage: String,

    /// Give up (and cancel the analysis) after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// text | json
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(Parser, Clone)]
pub struct QuotaArgs {
    #[command(flatten)]
    pub common: ConfigArgs,

    #[arg(long, env = "RELIA_CALLER", default_value = "anonymous")]
    pub caller: String,

    /// text | json
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(Parser, Clone)]
pub struct HistoryArgs {
    #[command(flatten)]
    pub common: ConfigArgs,

    #[arg(long, env = "RELIA_CALLER")]
    pub caller: String,

    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Export every row of the caller as CSV instead of a page
    #[arg(long)]
    pub csv: bool,

    /// Write the output here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// text | json (ignored with --csv)
    #[arg(long, default_value = "text")]
    pub format: String,
}

#[derive(Parser, Clone)]
pub struct DoctorArgs {
    #[command(flatten)]
    pub common: ConfigArgs,

    /// text | json
    #[arg(long, default_value = "text")]
    pub format: String,

    #[arg(long)]
    pub out: Option<PathBuf>,
}

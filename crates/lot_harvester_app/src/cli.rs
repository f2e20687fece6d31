use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::LevelFilter;

#[derive(Parser, Debug)]
#[command(name = "lot-harvester")]
#[command(about = "Harvest work-permit details by lot number into CSV checkpoints", long_about = None)]
pub struct Cli {
    /// RON configuration file; every field is optional.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    #[arg(long, global = true, value_enum, default_value_t = LogTarget::Terminal)]
    pub log_to: LogTarget,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Harvest the configured identifier range (the default).
    Run(RunArgs),
    /// Retry uploads recorded in the output directory's upload ledger.
    Reupload(ReuploadArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// First lot number, inclusive.
    #[arg(long)]
    pub start: Option<u64>,
    /// Last lot number, inclusive.
    #[arg(long)]
    pub end: Option<u64>,
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Pause after every lot number, in milliseconds.
    #[arg(long)]
    pub delay_ms: Option<u64>,
    #[arg(long)]
    pub max_attempts: Option<u32>,
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    #[arg(long, value_enum)]
    pub artifact_policy: Option<PolicyArg>,
    #[command(flatten)]
    pub sink: SinkArgs,
}

#[derive(Args, Debug, Default, Clone)]
pub struct ReuploadArgs {
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
    #[command(flatten)]
    pub sink: SinkArgs,
}

#[derive(Args, Debug, Default, Clone)]
pub struct SinkArgs {
    /// Upload artifacts with HTTP PUT below this URL.
    #[arg(long, conflicts_with = "sink_dir")]
    pub sink_url: Option<String>,
    /// Copy artifacts below this directory.
    #[arg(long)]
    pub sink_dir: Option<PathBuf>,
    /// Bearer token for `--sink-url`.
    #[arg(long, env = "LOT_HARVESTER_SINK_TOKEN", hide_env_values = true)]
    pub sink_token: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyArg {
    Append,
    PerBatch,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Terminal,
    File,
    Both,
}

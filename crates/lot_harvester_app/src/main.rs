mod cli;
mod commands;
mod config;
mod ledger;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use harvest_logging::harvest_info;

use crate::cli::{Cli, Command, RunArgs};
use crate::config::HarvestConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::initialize(cli.log_to, cli.log_level.into());

    let mut config = HarvestConfig::load(cli.config.as_deref())
        .context("loading configuration")?;

    match cli.command.unwrap_or_else(|| Command::Run(RunArgs::default())) {
        Command::Run(args) => {
            config.apply_run_args(&args);
            let summary = commands::run(&config).await?;
            harvest_info!(
                "{} of {} lots succeeded; artifacts: {:?}",
                summary.succeeded,
                summary.attempted,
                summary.artifacts
            );
        }
        Command::Reupload(args) => {
            config.apply_reupload_args(&args);
            commands::reupload(&config).await?;
        }
    }
    Ok(())
}

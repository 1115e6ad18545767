use anyhow::{Context, Result, bail};
use clap::Parser;
use log::info;

use scheduler_driver::cli::{Cli, Commands};
use scheduler_driver::config::load_config;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run { config } => {
            let path = config.to_str().context("config path is not valid UTF-8")?;
            let cfg = load_config(path)?;
            info!(
                "starting driver for scheduler-name={} tick-period={:?}",
                cfg.scheduler_name,
                cfg.tick_period()
            );

            // No concrete ClusterClient ships in this build (the transport is
            // out of scope); a real backend would be wired in here and handed
            // to `scheduler_driver::tick::run`.
            bail!("no ClusterClient backend is configured for this build");
        }
    }
}

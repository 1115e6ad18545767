use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "scheduler-driver", version, about = "Scheduler driver CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the poll-schedule-apply loop with a config file.
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },
}

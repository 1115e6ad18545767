pub mod cli;
pub mod client;
pub mod config;
pub mod tick;

pub use client::{ClusterClient, DriverError};
pub use config::{Config, load_config};
pub use tick::{TickReport, run, tick};

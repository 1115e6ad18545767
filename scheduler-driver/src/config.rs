use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

fn default_tick_period_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Matched against each pod's scheduler-name claim (§3, §6).
    pub scheduler_name: String,
    /// Informational only; the engine itself is cluster-wide (§6).
    pub namespace: String,
    #[serde(default = "default_tick_period_secs")]
    pub tick_period_secs: u64,
}

impl Config {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(self.tick_period_secs)
    }
}

pub fn load_config(path: &str) -> Result<Config> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read config from {path}"))?;
    let cfg: Config = serde_yaml::from_str(&content).context("failed to parse YAML config")?;
    Ok(cfg)
}

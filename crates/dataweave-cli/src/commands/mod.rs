//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod consume;
pub mod db;
pub mod ingest;
pub mod serve;

use anyhow::Context;
use dataweave_server::config::Config;

/// Configuration from `.env` and the environment, before command-line overrides
pub fn load_config() -> anyhow::Result<Config> {
    Config::load().context("Failed to load configuration")
}

pub mod config;
pub mod doctor;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

use sb_domain::config::Config;

/// SearchBridge bridges a content repository to an enterprise search
/// appliance.
#[derive(Debug, Parser)]
#[command(name = "searchbridge", version, about)]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "searchbridge.toml")]
    pub config: PathBuf,

    /// Override one config key, e.g. `-D feed.maxUrls=100`. Repeatable;
    /// wins over the file.
    #[arg(short = 'D', value_name = "KEY=VALUE")]
    pub define: Vec<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway (default when no subcommand is given).
    Serve,
    /// Run diagnostic checks against the current configuration.
    Doctor,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

/// Load the config file and apply `-D` overrides. Returns the resolved
/// config plus the overrides for the reload watcher to re-apply.
pub fn load_config(
    config_path: &std::path::Path,
    defines: &[String],
) -> anyhow::Result<(Config, Vec<(String, String)>)> {
    let mut config = Config::load(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let mut overrides = Vec::with_capacity(defines.len());
    for define in defines {
        let (key, value) = define
            .split_once('=')
            .with_context(|| format!("-D expects key=value, got {define:?}"))?;
        config.apply_override(key, value)?;
        overrides.push((key.to_owned(), value.to_owned()));
    }
    Ok((config, overrides))
}

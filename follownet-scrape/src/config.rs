//! Configuration resolution for follownet-scrape
//!
//! Priority: command line (with its environment fallbacks) → TOML file →
//! built-in defaults.

use std::path::PathBuf;

use clap::Parser;
use follownet_common::config::{load_resolved, TomlConfig};
use follownet_common::Result;
use tracing::info;

/// Command-line arguments
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "follownet-scrape", version, about = "FollowNet extraction service")]
pub struct Cli {
    /// Path to follownet.toml
    #[arg(short, long, env = "FOLLOWNET_CONFIG")]
    pub config: Option<PathBuf>,

    /// HTTP port
    #[arg(short, long, env = "FOLLOWNET_PORT")]
    pub port: Option<u16>,

    /// Address to bind the HTTP listener to
    #[arg(long)]
    pub bind_address: Option<String>,

    /// Log level when RUST_LOG is not set
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Load the TOML configuration and apply command-line overrides
pub fn resolve(cli: &Cli) -> Result<TomlConfig> {
    let config = load_resolved(cli.config.as_deref())?;
    apply_overrides(config, cli)
}

/// Apply command-line overrides on top of a loaded configuration
pub fn apply_overrides(mut config: TomlConfig, cli: &Cli) -> Result<TomlConfig> {
    if let Some(port) = cli.port {
        if port != config.server.port {
            info!("Port {} from command line (config: {})", port, config.server.port);
        }
        config.server.port = port;
    }
    if let Some(address) = &cli.bind_address {
        info!("Bind address {} from command line", address);
        config.server.bind_address = address.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Default `EnvFilter` directive for a configured level
pub fn log_filter(config: &TomlConfig) -> String {
    let level = config.logging.level.trim();
    format!(
        "follownet_scrape={level},follownet_common={level},tower_http=info",
        level = level
    )
}

/// `host:port` for the HTTP listener
pub fn listen_address(config: &TomlConfig) -> String {
    format!("{}:{}", config.server.bind_address, config.server.port)
}

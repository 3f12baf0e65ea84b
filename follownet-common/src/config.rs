//! TOML bootstrap configuration
//!
//! Every field has a built-in default, so an absent file or an empty file is
//! a valid configuration. Command-line overrides are applied by the binary.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "FOLLOWNET_CONFIG";

/// Bootstrap configuration loaded from `follownet.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub sessions: SessionConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    #[serde(default)]
    pub cors: CorsConfig,
}

/// HTTP listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// Session orchestration limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Limit applied when a request does not name one
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Safety ceiling for every session, including "unlimited" ones
    #[serde(default = "default_hard_limit")]
    pub hard_limit: usize,
    /// How long a stop request may remain unhonored
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// How long a lossless event may wait on a client that stopped reading
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
    /// Outbound event queue capacity per session
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Retention of final snapshots for export
    #[serde(default = "default_snapshot_ttl_secs")]
    pub snapshot_ttl_secs: u64,
    #[serde(default = "default_snapshot_capacity")]
    pub snapshot_capacity: usize,
}

/// GitHub extractor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubConfig {
    #[serde(default = "default_github_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Upper bound on follower/stargazer list pages per session
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    /// Pause between consecutive page loads
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Browser origins allowed to call the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_limit() -> usize {
    100
}

fn default_hard_limit() -> usize {
    1000
}

fn default_grace_period_ms() -> u64 {
    5000
}

fn default_idle_timeout_secs() -> u64 {
    300
}

fn default_event_buffer() -> usize {
    64
}

fn default_snapshot_ttl_secs() -> u64 {
    3600
}

fn default_snapshot_capacity() -> usize {
    64
}

fn default_github_base_url() -> String {
    "https://github.com".to_string()
}

fn default_user_agent() -> String {
    concat!("follownet/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_max_pages() -> u32 {
    5
}

fn default_request_delay_ms() -> u64 {
    250
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            hard_limit: default_hard_limit(),
            grace_period_ms: default_grace_period_ms(),
            idle_timeout_secs: default_idle_timeout_secs(),
            event_buffer: default_event_buffer(),
            snapshot_ttl_secs: default_snapshot_ttl_secs(),
            snapshot_capacity: default_snapshot_capacity(),
        }
    }
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            base_url: default_github_base_url(),
            user_agent: default_user_agent(),
            max_pages: default_max_pages(),
            request_delay_ms: default_request_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl TomlConfig {
    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        let sessions = &self.sessions;
        if sessions.hard_limit == 0 {
            return Err(Error::Config("sessions.hard_limit must be positive".into()));
        }
        if sessions.default_limit == 0 || sessions.default_limit > sessions.hard_limit {
            return Err(Error::Config(format!(
                "sessions.default_limit must be between 1 and hard_limit ({})",
                sessions.hard_limit
            )));
        }
        if sessions.event_buffer == 0 {
            return Err(Error::Config("sessions.event_buffer must be positive".into()));
        }
        if self.github.max_pages == 0 {
            return Err(Error::Config("github.max_pages must be positive".into()));
        }
        Ok(())
    }
}

/// Default config file location: `<config dir>/follownet/follownet.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("follownet").join("follownet.toml"))
}

/// Config file resolution order: explicit path, `FOLLOWNET_CONFIG`, OS default
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    default_config_path()
}

/// Parse TOML text into a validated configuration
pub fn parse_toml_config(content: &str) -> Result<TomlConfig> {
    let config: TomlConfig =
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from `path`; a missing file yields defaults
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        info!("No config file at {}, using built-in defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config = parse_toml_config(&content)?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Load from the resolved path, or defaults when no path can be determined
pub fn load_resolved(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg) {
        Some(path) => load_toml_config(&path),
        None => {
            warn!("Could not determine config directory, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}

//! Configuration for the `wirechat` client.
//!
//! Layered with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/wirechat/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::client::ClientConfig;
use crate::store::StoreConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerFileConfig,
    sync: SyncFileConfig,
    search: SearchFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    base_url: Option<String>,
    ws_url: Option<String>,
    connect_timeout_secs: Option<u64>,
}

/// `[sync]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SyncFileConfig {
    backoff_base_ms: Option<u64>,
    backoff_multiplier: Option<u32>,
    backoff_max_attempts: Option<u32>,
    echo_window_secs: Option<u64>,
    frame_buffer: Option<usize>,
    frame_capacity: Option<usize>,
}

/// `[search]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct SearchFileConfig {
    debounce_ms: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base URL of the chat server's REST API.
    pub base_url: Option<String>,
    /// WebSocket URL of the live channel.
    pub ws_url: Option<String>,
    /// Bearer token for the session.
    pub token: Option<String>,
    /// Timeout for the WebSocket connect handshake.
    pub connect_timeout: Duration,
    /// Sync-layer tunables (backoff, buffers, debounce).
    pub client: ClientConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            ws_url: None,
            token: None,
            connect_timeout: Duration::from_secs(10),
            client: ClientConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. Without `--config` the default path
    /// (`~/.config/wirechat/config.toml`) is tried and silently ignored
    /// if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or
    /// parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve an `AppConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default. Separated from `load()` to enable
    /// unit testing without CLI parsing.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();
        let backoff_defaults = BackoffPolicy::default();
        let store_defaults = StoreConfig::default();
        let client_defaults = ClientConfig::default();

        Self {
            base_url: cli.base_url.clone().or_else(|| file.server.base_url.clone()),
            ws_url: cli.ws_url.clone().or_else(|| file.server.ws_url.clone()),
            token: cli.token.clone(),
            connect_timeout: file
                .server
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            client: ClientConfig {
                backoff: BackoffPolicy {
                    base: file
                        .sync
                        .backoff_base_ms
                        .map_or(backoff_defaults.base, Duration::from_millis),
                    multiplier: file
                        .sync
                        .backoff_multiplier
                        .unwrap_or(backoff_defaults.multiplier),
                    max_attempts: file
                        .sync
                        .backoff_max_attempts
                        .unwrap_or(backoff_defaults.max_attempts),
                },
                store: StoreConfig {
                    frame_buffer: file.sync.frame_buffer.unwrap_or(store_defaults.frame_buffer),
                    echo_window: file
                        .sync
                        .echo_window_secs
                        .map_or(store_defaults.echo_window, Duration::from_secs),
                },
                search_debounce: file
                    .search
                    .debounce_ms
                    .map_or(client_defaults.search_debounce, Duration::from_millis),
                frame_capacity: file
                    .sync
                    .frame_capacity
                    .unwrap_or(client_defaults.frame_capacity),
            },
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Resilient direct-message sync client")]
pub struct CliArgs {
    /// Base URL of the chat server's REST API.
    #[arg(long, env = "WIRECHAT_BASE_URL")]
    pub base_url: Option<String>,

    /// WebSocket URL of the live channel.
    #[arg(long, env = "WIRECHAT_WS_URL")]
    pub ws_url: Option<String>,

    /// Bearer token for the session.
    #[arg(long, env = "WIRECHAT_TOKEN")]
    pub token: Option<String>,

    /// Your user id (UUID).
    #[arg(long, env = "WIRECHAT_USER_ID")]
    pub user_id: Option<String>,

    /// Peer to open a conversation with (UUID).
    #[arg(long)]
    pub peer: Option<String>,

    /// Path to config file (default: `~/.config/wirechat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "WIRECHAT_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/wirechat.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing
/// file is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            // No config dir available, use defaults.
            return Ok(ConfigFile::default());
        };
        config_dir.join("wirechat").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

//! Configuration loader for the ceserver client
//!
//! Handles loading configuration from TOML files and merging with defaults.

use super::defaults::default_config;
use crate::core::types::{Offset, ProcessId, ValueType};
use crate::protocol::session::ConnectOptions;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File read when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "ceserver-client.toml";

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_client")]
    pub client: ClientConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watch: Option<WatchConfig>,
}

/// Where ceserver listens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
}

/// Client-side limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Largest trailing payload accepted in one response
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,
    /// zlib level for memory reads, 0 = uncompressed
    #[serde(default = "default_compression_level")]
    pub compression_level: u8,
    /// Sessions used by batch reads
    #[serde(default = "default_workers")]
    pub workers: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

/// A pointer chain to poll.
///
/// The target is either a pid or the first process whose name contains
/// `process_name`. With `module` set, the chain's base is relative to that
/// module's load address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    pub pid: Option<ProcessId>,
    pub process_name: Option<String>,
    pub module: Option<String>,
    /// Textual chain, e.g. `"0x1000 -> 0x10 -> 0x8"`
    pub chain: String,
    #[serde(default)]
    pub final_offset: Offset,
    pub value_type: ValueType,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Config {
    /// Connection settings for a session
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            host: self.server.host.clone(),
            port: self.server.port,
            connect_timeout: Duration::from_millis(self.server.connect_timeout_ms),
            io_timeout: Duration::from_millis(self.server.io_timeout_ms),
            max_payload: self.client.max_payload_size,
            compression_level: self.client.compression_level,
        }
    }
}

/// Configuration loader
pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Creates a new configuration loader
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        ConfigLoader {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Loads configuration from file
    pub fn load(&self) -> Result<Config, ConfigError> {
        if !self.config_path.exists() {
            return Err(ConfigError::FileNotFound(
                self.config_path.display().to_string(),
            ));
        }

        let contents = fs::read_to_string(&self.config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Loads configuration, falling back to defaults only when the file is missing
    pub fn load_or_default(&self) -> Result<Config, ConfigError> {
        match self.load() {
            Err(ConfigError::FileNotFound(_)) => Ok(Config::default()),
            other => other,
        }
    }

    /// Saves configuration to file
    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, contents)?;
        Ok(())
    }
}

/// Loads `path`, or [`DEFAULT_CONFIG_FILE`] if present, otherwise defaults
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => ConfigLoader::new(path).load(),
        None => ConfigLoader::new(DEFAULT_CONFIG_FILE).load_or_default(),
    }
}

// Default functions for serde
fn default_server() -> ServerConfig {
    let defaults = default_config();
    ServerConfig {
        host: defaults.server.host,
        port: defaults.server.port,
        connect_timeout_ms: defaults.server.connect_timeout_ms,
        io_timeout_ms: defaults.server.io_timeout_ms,
    }
}

fn default_client() -> ClientConfig {
    let defaults = default_config();
    ClientConfig {
        max_payload_size: defaults.client.max_payload_size,
        compression_level: defaults.client.compression_level,
        workers: defaults.client.workers,
    }
}

fn default_logging() -> LoggingConfig {
    let defaults = default_config();
    LoggingConfig {
        level: defaults.logging.level,
        json: defaults.logging.json,
    }
}

// Individual field defaults
fn default_host() -> String {
    default_config().server.host
}

fn default_port() -> u16 {
    default_config().server.port
}

fn default_connect_timeout_ms() -> u64 {
    default_config().server.connect_timeout_ms
}

fn default_io_timeout_ms() -> u64 {
    default_config().server.io_timeout_ms
}

fn default_max_payload_size() -> usize {
    default_config().client.max_payload_size
}

fn default_compression_level() -> u8 {
    default_config().client.compression_level
}

fn default_workers() -> usize {
    default_config().client.workers
}

fn default_log_level() -> String {
    default_config().logging.level
}

fn default_interval_ms() -> u64 {
    default_config().watch.interval_ms
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: default_server(),
            client: default_client(),
            logging: default_logging(),
            watch: None,
        }
    }
}

//! Default configuration values for the ceserver client

use serde::{Deserialize, Serialize};

/// Default configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDefaults {
    pub server: ServerDefaults,
    pub client: ClientDefaults,
    pub logging: LoggingDefaults,
    pub watch: WatchDefaults,
}

/// Default server endpoint and timeouts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDefaults {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
    pub io_timeout_ms: u64,
}

/// Default client-side limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientDefaults {
    pub max_payload_size: usize,
    pub compression_level: u8,
    pub workers: usize,
}

/// Default logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingDefaults {
    pub level: String,
    pub json: bool,
}

/// Defaults for a watched pointer chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchDefaults {
    pub interval_ms: u64,
}

/// Returns the default configuration
pub fn default_config() -> ConfigDefaults {
    ConfigDefaults {
        server: ServerDefaults {
            host: "127.0.0.1".to_string(),
            port: crate::core::DEFAULT_PORT,
            connect_timeout_ms: 5000,
            io_timeout_ms: 5000,
        },
        client: ClientDefaults {
            max_payload_size: 16 * 1024 * 1024, // 16MB
            compression_level: 0,
            workers: num_cpus::get(),
        },
        logging: LoggingDefaults {
            level: "info".to_string(),
            json: false,
        },
        watch: WatchDefaults { interval_ms: 1000 },
    }
}

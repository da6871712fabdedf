//! Configuration validator for the ceserver client
//!
//! Validates configuration values to ensure they are within acceptable ranges.

use super::loader::{ClientConfig, Config, ConfigError, LoggingConfig, ServerConfig, WatchConfig};
use crate::memory::pointer::PointerChain;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the entire configuration
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        Self::validate_server(&config.server)?;
        Self::validate_client(&config.client)?;
        Self::validate_logging(&config.logging)?;
        if let Some(watch) = &config.watch {
            Self::validate_watch(watch)?;
        }
        Ok(())
    }

    /// Validates server configuration
    fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
        if server.port == 0 {
            return Err(ConfigError::Invalid("Server port cannot be 0".to_string()));
        }

        if server.host.is_empty() {
            return Err(ConfigError::Invalid(
                "Server host cannot be empty".to_string(),
            ));
        }

        // a zero socket timeout means "block forever" to the OS
        if server.connect_timeout_ms == 0 || server.io_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "Server timeouts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates client limits
    fn validate_client(client: &ClientConfig) -> Result<(), ConfigError> {
        if client.max_payload_size == 0 {
            return Err(ConfigError::Invalid(
                "Maximum payload size must be greater than 0".to_string(),
            ));
        }

        if client.compression_level > 9 {
            return Err(ConfigError::Invalid(format!(
                "Compression level {} out of range 0-9",
                client.compression_level
            )));
        }

        if client.workers == 0 {
            return Err(ConfigError::Invalid(
                "Workers must be at least 1".to_string(),
            ));
        }

        if client.workers > 128 {
            return Err(ConfigError::Invalid(
                "Workers cannot exceed 128".to_string(),
            ));
        }

        Ok(())
    }

    /// Validates logging configuration
    fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                logging.level, valid_levels
            )));
        }

        Ok(())
    }

    /// Validates the watched chain
    fn validate_watch(watch: &WatchConfig) -> Result<(), ConfigError> {
        match (&watch.pid, &watch.process_name) {
            (None, None) => {
                return Err(ConfigError::Invalid(
                    "Watch needs either pid or process_name".to_string(),
                ))
            }
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid(
                    "Watch takes pid or process_name, not both".to_string(),
                ))
            }
            _ => {}
        }

        watch
            .chain
            .parse::<PointerChain>()
            .map_err(|e| ConfigError::Invalid(format!("Watch chain: {}", e)))?;

        if watch.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "Watch interval must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Validates a configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    ConfigValidator::validate(config)
}

//! Configuration management for Helios
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files.

use crate::error::{HeliosError, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GraphQL API connection configuration
    pub api: ApiConfig,

    /// Optional specific home ID; empty selects the first home on the account
    pub home_id: String,

    /// Price cache and refresh scheduling configuration
    pub prices: PricesConfig,

    /// Live measurement subscription configuration
    pub live: LiveConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Provider reference timezone (IANA name) for day-boundary arithmetic
    pub timezone: String,

    /// Path of the JSON settings store (token, report watermarks)
    pub settings_file: String,

    /// Price poll interval in seconds
    pub poll_interval_secs: u64,
}

/// GraphQL API connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// GraphQL endpoint URL
    pub endpoint: String,

    /// Access token; when empty the token is read from the settings store
    pub access_token: String,

    /// Request timeout in seconds (generous; the API can be slow)
    pub timeout_secs: u64,

    /// User-Agent header sent with every request
    pub user_agent: String,
}

/// Price cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PricesConfig {
    /// Hour of day (provider timezone) after which next-day prices are
    /// expected to have been published
    pub publish_cutoff_hour: u32,

    /// Upper bound in seconds for the random delay before a scheduled
    /// refresh, spreading load across instances
    pub max_refresh_delay_secs: u64,
}

/// Live subscription configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Base silence window in seconds before a stream is considered dead
    pub silence_window_secs: u64,

    /// Upper bound in seconds for the one-time jitter added to the silence
    /// window
    pub silence_jitter_max_secs: u64,

    /// Minimum reconnect backoff in seconds after a transport error
    pub backoff_min_secs: u64,

    /// Maximum reconnect backoff in seconds after a transport error
    pub backoff_max_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file or log directory
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.tibber.com/v1-beta/gql".to_string(),
            access_token: String::new(),
            timeout_secs: 300,
            user_agent: "helios/0.6".to_string(),
        }
    }
}

impl Default for PricesConfig {
    fn default() -> Self {
        Self {
            publish_cutoff_hour: 13,
            max_refresh_delay_secs: 50 * 60,
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            silence_window_secs: 10 * 60,
            silence_jitter_max_secs: 10,
            backoff_min_secs: 5,
            backoff_max_secs: 120,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/helios.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            home_id: String::new(),
            prices: PricesConfig::default(),
            live: LiveConfig::default(),
            logging: LoggingConfig::default(),
            timezone: "Europe/Oslo".to_string(),
            settings_file: "/data/helios_settings.json".to_string(),
            poll_interval_secs: 3600,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        let default_paths = [
            "helios_config.yaml",
            "/data/helios_config.yaml",
            "/etc/helios/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse the configured reference timezone
    pub fn reference_timezone(&self) -> Result<Tz> {
        Tz::from_str(&self.timezone)
            .map_err(|_| HeliosError::validation("timezone", &format!("Unknown timezone: {}", self.timezone)))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.api.endpoint.is_empty() {
            return Err(HeliosError::validation(
                "api.endpoint",
                "Endpoint cannot be empty",
            ));
        }

        if self.api.timeout_secs == 0 {
            return Err(HeliosError::validation(
                "api.timeout_secs",
                "Must be greater than 0",
            ));
        }

        if self.prices.publish_cutoff_hour >= 24 {
            return Err(HeliosError::validation(
                "prices.publish_cutoff_hour",
                "Must be an hour of day (0-23)",
            ));
        }

        if self.live.silence_window_secs == 0 {
            return Err(HeliosError::validation(
                "live.silence_window_secs",
                "Must be greater than 0",
            ));
        }

        if self.live.backoff_min_secs > self.live.backoff_max_secs {
            return Err(HeliosError::validation(
                "live.backoff_min_secs",
                "Must not exceed live.backoff_max_secs",
            ));
        }

        if self.poll_interval_secs == 0 {
            return Err(HeliosError::validation(
                "poll_interval_secs",
                "Must be greater than 0",
            ));
        }

        self.reference_timezone()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.prices.publish_cutoff_hour, 13);
        assert_eq!(config.live.backoff_max_secs, 120);
        assert_eq!(config.timezone, "Europe/Oslo");
        assert_eq!(config.poll_interval_secs, 3600);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        // Test invalid endpoint
        config.api.endpoint = String::new();
        assert!(config.validate().is_err());

        // Reset and test invalid cutoff
        config = Config::default();
        config.prices.publish_cutoff_hour = 24;
        assert!(config.validate().is_err());

        // Inverted backoff bounds
        config = Config::default();
        config.live.backoff_min_secs = 300;
        assert!(config.validate().is_err());

        // Unknown timezone
        config = Config::default();
        config.timezone = "Mars/Olympus_Mons".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.api.endpoint, deserialized.api.endpoint);
        assert_eq!(
            config.prices.max_refresh_delay_secs,
            deserialized.prices.max_refresh_delay_secs
        );
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "timezone: Europe/Berlin\npoll_interval_secs: 900\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.timezone, "Europe/Berlin");
        assert_eq!(config.poll_interval_secs, 900);
        assert_eq!(config.prices.publish_cutoff_hour, 13);
    }
}

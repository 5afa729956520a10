/*!
 * Configuration management for Wireflow.
 *
 * This module provides functionality to load, validate, and access the
 * settings shared by every protocol connection: logging, conversation limits
 * and framing thresholds.
 */
use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::utils::millis_to_duration;

/// Core configuration for Wireflow
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Request/response correlation settings
    #[serde(default)]
    pub conversation: ConversationSettings,

    /// Stream framing settings
    #[serde(default)]
    pub framing: FramingSettings,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Application environment (development, production, etc.)
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, wireflow_engine=trace)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to use JSON format for logs
    #[serde(default)]
    pub json_format: bool,
}

/// Settings for the per-connection conversation engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSettings {
    /// Deadline applied to a request when the caller gives none
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Maximum number of requests awaiting a response on one connection
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Depth of the submission channel feeding the connection loop
    #[serde(default = "default_submission_queue_depth")]
    pub submission_queue_depth: usize,

    /// Number of expired requests remembered to recognise late responses
    #[serde(default = "default_late_response_memory")]
    pub late_response_memory: usize,

    /// Depth of the queue feeding subscription callbacks
    #[serde(default = "default_event_queue_depth")]
    pub event_queue_depth: usize,
}

/// Settings for the stream frame decoder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramingSettings {
    /// Largest frame accepted before the stream is treated as corrupted
    #[serde(default = "default_max_frame_length")]
    pub max_frame_length: usize,

    /// Consecutive corrupted frames tolerated before the connection is torn down
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            environment: default_environment(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for ConversationSettings {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            max_in_flight: default_max_in_flight(),
            submission_queue_depth: default_submission_queue_depth(),
            late_response_memory: default_late_response_memory(),
            event_queue_depth: default_event_queue_depth(),
        }
    }
}

impl Default for FramingSettings {
    fn default() -> Self {
        Self {
            max_frame_length: default_max_frame_length(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

impl ConversationSettings {
    /// The default request deadline as a `Duration`
    pub fn default_timeout(&self) -> Duration {
        millis_to_duration(self.default_timeout_ms)
    }
}

impl Config {
    /// Parse a configuration from an inline TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Config = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as a TOML document
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }

    /// Reject settings that would leave a connection unable to make progress
    pub fn validate(&self) -> Result<()> {
        if self.conversation.max_in_flight == 0 {
            return Err(Error::config("conversation.max_in_flight must be at least 1"));
        }
        if self.conversation.submission_queue_depth == 0 {
            return Err(Error::config(
                "conversation.submission_queue_depth must be at least 1",
            ));
        }
        if self.conversation.event_queue_depth == 0 {
            return Err(Error::config("conversation.event_queue_depth must be at least 1"));
        }
        if self.conversation.default_timeout_ms == 0 {
            return Err(Error::config("conversation.default_timeout_ms must be positive"));
        }
        if self.framing.max_frame_length == 0 {
            return Err(Error::config("framing.max_frame_length must be positive"));
        }
        Ok(())
    }
}

fn default_app_name() -> String {
    "wireflow".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_max_in_flight() -> usize {
    64
}

fn default_submission_queue_depth() -> usize {
    32
}

fn default_late_response_memory() -> usize {
    32
}

fn default_event_queue_depth() -> usize {
    256
}

fn default_max_frame_length() -> usize {
    65_536
}

fn default_max_consecutive_failures() -> usize {
    16
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
    override_with: Option<Config>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Override with an existing config
    pub fn override_with(mut self, config: Config) -> Self {
        self.override_with = Some(config);
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<Config> {
        if let Some(config) = self.override_with {
            config.validate()?;
            return Ok(config);
        }

        let mut config_builder = ConfigLib::builder();

        // Start with default values
        let default_config = Config::default();
        config_builder = config_builder.add_source(
            ConfigLib::try_from(&default_config)
                .map_err(|e| Error::config(format!("Failed to create default config: {}", e)))?,
        );

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if path.exists() {
                debug!("Loading configuration from {}", config_file);
                config_builder = config_builder.add_source(File::with_name(&config_file));
            } else {
                debug!("Configuration file {} does not exist, using defaults", config_file);
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config_lib = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        let config: Config = config_lib
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.app_name, "wireflow");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.conversation.max_in_flight, 64);
        assert_eq!(config.conversation.default_timeout(), Duration::from_secs(5));
        assert_eq!(config.framing.max_consecutive_failures, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder_defaults() -> Result<()> {
        let config = ConfigBuilder::new().build()?;
        assert_eq!(config.general.app_name, "wireflow");
        assert_eq!(config.framing.max_frame_length, 65_536);
        Ok(())
    }

    #[test]
    fn test_config_builder_with_file() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("wireflow.toml");

        {
            let mut file = File::create(&file_path)?;
            file.write_all(
                br#"
                [general]
                app_name = "line-3"

                [conversation]
                default_timeout_ms = 250
                max_in_flight = 4

                [framing]
                max_consecutive_failures = 3
            "#,
            )?;
        }

        let config = ConfigBuilder::new().with_config_file(file_path).build()?;

        assert_eq!(config.general.app_name, "line-3");
        assert_eq!(config.conversation.default_timeout(), Duration::from_millis(250));
        assert_eq!(config.conversation.max_in_flight, 4);
        assert_eq!(config.conversation.submission_queue_depth, 32);
        assert_eq!(config.framing.max_consecutive_failures, 3);

        Ok(())
    }

    #[test]
    fn test_config_builder_with_env() -> Result<()> {
        env::set_var("WFENVTEST__CONVERSATION__MAX_IN_FLIGHT", "8");
        env::set_var("WFENVTEST__LOGGING__LEVEL", "trace");

        let config = ConfigBuilder::new()
            .with_environment_prefix("wfenvtest")
            .build()?;

        assert_eq!(config.conversation.max_in_flight, 8);
        assert_eq!(config.logging.level, "trace");

        env::remove_var("WFENVTEST__CONVERSATION__MAX_IN_FLIGHT");
        env::remove_var("WFENVTEST__LOGGING__LEVEL");

        Ok(())
    }

    #[test]
    fn test_rejects_zero_in_flight() {
        let result = Config::from_toml_str(
            r#"
            [conversation]
            max_in_flight = 0
        "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_toml_round_trip() -> Result<()> {
        let mut config = Config::default();
        config.framing.max_frame_length = 260;
        let rendered = config.to_toml_string()?;
        let parsed = Config::from_toml_str(&rendered)?;
        assert_eq!(parsed.framing.max_frame_length, 260);
        Ok(())
    }
}

//! Configuration management for the packet engine
//!
//! Loads configuration from config.toml at startup.
//! Every value has a default, so a missing file is not an error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Engine configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Load generator settings
    #[serde(default)]
    pub loadtest: LoadTestSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server and event loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address to bind (port comes from the command line)
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Size of every pooled receive buffer (safe UDP payload size)
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Buffers pre-allocated at startup
    #[serde(default = "default_initial_pool_size")]
    pub initial_pool_size: usize,

    /// Pool ceiling before falling back to transient buffers
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,

    /// Max datagrams received (and responses sent) per loop iteration
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Receive timeout per attempt in microseconds
    #[serde(default = "default_recv_timeout_us")]
    pub recv_timeout_us: u64,

    /// Kernel send/receive buffer size in bytes
    #[serde(default = "default_socket_buffer_bytes")]
    pub socket_buffer_bytes: usize,

    /// Interval between periodic stats reports in milliseconds
    #[serde(default = "default_stats_interval_ms")]
    pub stats_interval_ms: u64,

    /// Iterations used by `LOAD` without an argument
    #[serde(default = "default_load_iterations")]
    pub default_load_iterations: u64,

    /// Largest accepted `LOAD` argument
    #[serde(default = "default_max_load_iterations")]
    pub max_load_iterations: u64,

    /// Port for the HTTP stats API (disabled when unset)
    #[serde(default)]
    pub api_port: Option<u16>,
}

/// Load generator defaults (targets and rates come from the command line)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoadTestSettings {
    /// How long a worker waits for each response, in milliseconds
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,

    /// Receive buffer size for responses
    #[serde(default = "default_response_buffer_size")]
    pub response_buffer_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write rolling log files in addition to the console
    #[serde(default = "default_file_output")]
    pub file_output: bool,

    /// Directory for log files
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            buffer_size: default_buffer_size(),
            initial_pool_size: default_initial_pool_size(),
            max_pool_size: default_max_pool_size(),
            max_batch_size: default_max_batch_size(),
            recv_timeout_us: default_recv_timeout_us(),
            socket_buffer_bytes: default_socket_buffer_bytes(),
            stats_interval_ms: default_stats_interval_ms(),
            default_load_iterations: default_load_iterations(),
            max_load_iterations: default_max_load_iterations(),
            api_port: None,
        }
    }
}

impl Default for LoadTestSettings {
    fn default() -> Self {
        Self {
            response_timeout_ms: default_response_timeout_ms(),
            response_buffer_size: default_response_buffer_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file_output: default_file_output(),
            directory: default_log_directory(),
        }
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_buffer_size() -> usize {
    1400
}

fn default_initial_pool_size() -> usize {
    1000
}

fn default_max_pool_size() -> usize {
    2000
}

fn default_max_batch_size() -> usize {
    50
}

fn default_recv_timeout_us() -> u64 {
    1000 // 1ms
}

fn default_socket_buffer_bytes() -> usize {
    4 * 1024 * 1024
}

fn default_stats_interval_ms() -> u64 {
    5000
}

fn default_load_iterations() -> u64 {
    1000
}

fn default_max_load_iterations() -> u64 {
    10_000_000
}

fn default_response_timeout_ms() -> u64 {
    5000
}

fn default_response_buffer_size() -> usize {
    1024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_file_output() -> bool {
    true
}

fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}

impl Config {
    /// Load configuration from the file named by CONFIG_PATH (default config.toml)
    ///
    /// If the file doesn't exist, returns default configuration.
    /// # Errors
    /// Returns error if file exists but cannot be parsed or fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from(config_path)
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(contents) => Self::from_toml(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File not found - use defaults
                Ok(Config::default())
            }
            Err(e) => Err(ConfigError::IoError(e)),
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if self.loadtest.response_timeout_ms == 0 {
            return Err(ConfigError::Invalid("loadtest.response_timeout_ms must be > 0"));
        }
        if self.loadtest.response_buffer_size == 0 {
            return Err(ConfigError::Invalid("loadtest.response_buffer_size must be > 0"));
        }
        Ok(())
    }
}

impl ServerConfig {
    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::Invalid("server.buffer_size must be > 0"));
        }
        if self.max_pool_size == 0 {
            return Err(ConfigError::Invalid("server.max_pool_size must be > 0"));
        }
        if self.initial_pool_size > self.max_pool_size {
            return Err(ConfigError::Invalid(
                "server.initial_pool_size must not exceed server.max_pool_size",
            ));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::Invalid("server.max_batch_size must be > 0"));
        }
        if self.recv_timeout_us == 0 {
            return Err(ConfigError::Invalid("server.recv_timeout_us must be > 0"));
        }
        if self.stats_interval_ms == 0 {
            return Err(ConfigError::Invalid("server.stats_interval_ms must be > 0"));
        }
        if self.default_load_iterations > self.max_load_iterations {
            return Err(ConfigError::Invalid(
                "server.default_load_iterations must not exceed server.max_load_iterations",
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_micros(self.recv_timeout_us)
    }

    #[inline]
    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading file
    IoError(std::io::Error),
    /// Parse error (invalid TOML)
    ParseError(String),
    /// Value out of range
    Invalid(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::ParseError(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::ParseError(_) | ConfigError::Invalid(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind_address, "0.0.0.0");
        assert_eq!(config.server.buffer_size, 1400);
        assert_eq!(config.server.initial_pool_size, 1000);
        assert_eq!(config.server.max_pool_size, 2000);
        assert_eq!(config.server.max_batch_size, 50);
        assert_eq!(config.server.recv_timeout(), Duration::from_millis(1));
        assert_eq!(config.server.stats_interval(), Duration::from_secs(5));
        assert_eq!(config.server.api_port, None);
        assert_eq!(config.loadtest.response_timeout_ms, 5000);
        assert_eq!(config.logging.directory, PathBuf::from("logs"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::from_toml(
            r#"
            [server]
            max_batch_size = 8
            api_port = 9090

            [logging]
            file_output = false
            "#,
        )
        .unwrap();

        assert_eq!(config.server.max_batch_size, 8);
        assert_eq!(config.server.api_port, Some(9090));
        assert_eq!(config.server.buffer_size, 1400);
        assert!(!config.logging.file_output);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_invalid_toml() {
        let err = Config::from_toml("[server\nmax_batch_size = 1").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_validation_rejects_bad_pool() {
        let err = Config::from_toml(
            r#"
            [server]
            initial_pool_size = 10
            max_pool_size = 5
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_validation_rejects_zero_batch() {
        let mut config = ServerConfig::default();
        config.max_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = Config::load_from("definitely/not/here/config.toml").unwrap();
        assert_eq!(config.server.max_pool_size, 2000);
    }
}

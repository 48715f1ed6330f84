// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
    pub stream: StreamConfig,
    #[serde(default)]
    pub shares: Vec<ShareConfig>,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// Performance configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PerformanceConfig {
    /// Keep-alive switch: 0 closes each connection after one response, any other
    /// value keeps it open (idle connections are bounded by `read_timeout`)
    pub keep_alive_timeout: u64,
    /// Seconds allowed for a client to send request headers
    pub read_timeout: u64,
    pub max_connections: Option<u64>,
}

/// File streaming configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StreamConfig {
    /// Capacity of each body chunk in bytes
    pub chunk_size: usize,
}

/// One exposed directory: `/<name>/...` maps below `path`
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ShareConfig {
    pub name: String,
    pub path: String,
}

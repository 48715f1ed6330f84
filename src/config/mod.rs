// Configuration module entry point
// Loads configuration and builds the shared, read-only application state

mod state;
mod types;

use std::net::SocketAddr;

// Re-export public types
pub use state::AppState;
pub use types::{
    Config, LoggingConfig, PerformanceConfig, ServerConfig, ShareConfig, StreamConfig,
};

use crate::http::stream::DEFAULT_CHUNK_SIZE;
use crate::sandbox::{PathResolver, SandboxError, SandboxRoot};

/// Default config file name (without extension)
pub const DEFAULT_CONFIG_PATH: &str = "config";

impl Config {
    /// Load configuration from specified file path (extension optional)
    /// Environment variables prefixed with `MEDIASHARE__` override file values,
    /// e.g. `MEDIASHARE__SERVER__PORT=9000`
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let chunk_size = i64::try_from(DEFAULT_CHUNK_SIZE).unwrap_or(i64::MAX);
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(
                config::Environment::with_prefix("MEDIASHARE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("logging.access_log_format", "combined")?
            .set_default("performance.keep_alive_timeout", 75)?
            .set_default("performance.read_timeout", 30)?
            .set_default("stream.chunk_size", chunk_size)?
            .set_default("shares", Vec::<String>::new())?
            .build()?;

        settings.try_deserialize()
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }

    /// Build the path resolver from the `[[shares]]` list, in configuration order
    pub fn build_resolver(&self) -> Result<PathResolver, SandboxError> {
        let roots = self
            .shares
            .iter()
            .map(|share| SandboxRoot::new(&share.name, &share.path))
            .collect::<Result<Vec<_>, _>>()?;
        PathResolver::new(roots)
    }
}

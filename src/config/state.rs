// Application state module
// Read-only state shared by every connection

use super::types::Config;
use crate::sandbox::{PathResolver, SandboxError};

/// Application state
///
/// Built once at startup and shared through an `Arc`; nothing in it changes while
/// the server runs, so requests read it without locking.
#[derive(Debug)]
pub struct AppState {
    pub config: Config,
    pub resolver: PathResolver,
    pub access_log: bool,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self, SandboxError> {
        Ok(Self {
            resolver: config.build_resolver()?,
            access_log: config.logging.access_log,
            config: config.clone(),
        })
    }

    /// Build state around an already constructed resolver
    pub fn with_resolver(config: &Config, resolver: PathResolver) -> Self {
        Self {
            config: config.clone(),
            resolver,
            access_log: config.logging.access_log,
        }
    }
}

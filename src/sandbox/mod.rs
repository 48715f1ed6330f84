//! Sandbox module
//!
//! Maps request paths onto the configured shares. A request path's first segment
//! names the share, the rest is looked up below that share's base directory and is
//! never allowed to climb out of it.

mod resolver;

pub use resolver::{
    normalize_lexically, DirEntry, EntryKind, PathResolver, Resolution, ResolvedEntry,
    SandboxRoot,
};

use thiserror::Error;

/// Errors raised while building the sandbox from configuration
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("duplicate share name '{0}'")]
    DuplicateName(String),
    #[error("invalid share name '{0}': must be non-empty and contain no '/'")]
    InvalidName(String),
    #[error("cannot make share path '{path}' absolute: {source}")]
    BasePath {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

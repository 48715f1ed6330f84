//! mediashare
//!
//! Serves a set of configured directories over HTTP for browsing and media playback:
//! sandboxed path resolution, magic-byte content type sniffing and byte-range
//! streaming on top of tokio and hyper.

pub mod config;
pub mod handler;
pub mod http;
pub mod logger;
pub mod sandbox;
pub mod server;

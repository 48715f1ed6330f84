//! Request handler module
//!
//! Responsible for request routing dispatch: share index, directory listings and
//! file streaming.

pub mod listing;
pub mod router;

// Re-export main entry point
pub use router::handle_request;

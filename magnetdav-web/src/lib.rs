//! Magnetdav Web - WebDAV file access and JSON API server

#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::too_many_lines)]
//!
//! Serves catalogued content as a read-only WebDAV tree with range support,
//! plus a small JSON API for submitting and managing magnet links.

pub mod error;
pub mod handlers;
pub mod render;
pub mod server;

// Re-export main types
pub use error::WebError;
pub use server::{AppState, build_router, run_server, shutdown_signal};

//! HTTP request handlers organized by functionality

pub mod api;
pub mod auth;
pub mod webdav;

// Re-export handler functions
pub use api::{
    AddMagnetRequest, HealthResponse, Stats, api_add_magnet, api_health, api_magnet_files,
    api_magnets, api_remove_magnet, api_stats,
};
pub use auth::{AUTH_CHALLENGE, decode_basic, require_basic_auth};
pub use webdav::{dav_cors, webdav_content, webdav_file, webdav_root};

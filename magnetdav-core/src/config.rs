//! Centralized configuration for Magnetdav.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

/// Central configuration for all Magnetdav components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct MagnetdavConfig {
    pub server: ServerConfig,
    pub catalog: CatalogConfig,
    pub swarm: SwarmConfig,
    pub streaming: StreamingConfig,
    pub auth: AuthConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    /// Socket address string for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Catalog database configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// How long a writer waits on a locked database
    pub busy_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/magnetdav.db"),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Swarm engine configuration.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// How long an acquisition waits for content metadata
    pub metadata_timeout: Duration,
    /// Directory of seeded content for the simulated swarm
    pub seed_dir: Option<PathBuf>,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            metadata_timeout: Duration::from_secs(30),
            seed_dir: None,
        }
    }
}

/// Range streaming and cache configuration.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Read-ahead hint given to swarm readers
    pub readahead_bytes: u64,
    /// Size of body chunks read per poll
    pub chunk_size: usize,
    /// Freshness of whole-file media responses
    pub media_whole_file_max_age: Duration,
    /// Freshness of partial media responses
    pub media_range_max_age: Duration,
    /// Freshness of non-media responses
    pub default_max_age: Duration,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            readahead_bytes: 2 * 1024 * 1024, // 2 MiB
            chunk_size: 64 * 1024,            // 64 KiB
            media_whole_file_max_age: Duration::from_secs(86_400),
            media_range_max_age: Duration::from_secs(1_800),
            default_max_age: Duration::from_secs(3_600),
        }
    }
}

/// Basic authentication for the file-access routes.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub enabled: bool,
    pub username: String,
    pub password: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            username: "admin".to_string(),
            password: "password".to_string(),
        }
    }
}

impl MagnetdavConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("MAGNETDAV_HOST") {
            config.server.host = host;
        }

        if let Ok(port) = std::env::var("MAGNETDAV_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.server.port = port;
            }
        }

        if let Ok(path) = std::env::var("MAGNETDAV_DB") {
            config.catalog.database_path = PathBuf::from(path);
        }

        if let Ok(dir) = std::env::var("MAGNETDAV_SEED_DIR") {
            config.swarm.seed_dir = Some(PathBuf::from(dir));
        }

        if let Ok(timeout) = std::env::var("MAGNETDAV_METADATA_TIMEOUT") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                config.swarm.metadata_timeout = Duration::from_secs(seconds);
            }
        }

        // Auth configuration overrides
        if let Ok(enabled) = std::env::var("MAGNETDAV_AUTH_ENABLED") {
            config.auth.enabled = enabled.parse().unwrap_or(false);
        }

        if let Ok(username) = std::env::var("MAGNETDAV_USERNAME") {
            config.auth.username = username;
        }

        if let Ok(password) = std::env::var("MAGNETDAV_PASSWORD") {
            config.auth.password = password;
        }

        config
    }

    /// Creates a configuration optimized for testing.
    pub fn for_testing() -> Self {
        Self {
            swarm: SwarmConfig {
                metadata_timeout: Duration::from_millis(200),
                seed_dir: None,
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = MagnetdavConfig::default();

        assert_eq!(config.server.bind_address(), "127.0.0.1:3000");
        assert_eq!(config.swarm.metadata_timeout, Duration::from_secs(30));
        assert_eq!(config.streaming.readahead_bytes, 2 * 1024 * 1024);
        assert_eq!(
            config.streaming.media_whole_file_max_age,
            Duration::from_secs(86_400)
        );
        assert!(!config.auth.enabled);
    }

    #[test]
    fn test_testing_preset() {
        let config = MagnetdavConfig::for_testing();
        assert!(config.swarm.metadata_timeout < Duration::from_secs(1));
        assert!(config.swarm.seed_dir.is_none());
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("MAGNETDAV_PORT", "8123");
            std::env::set_var("MAGNETDAV_METADATA_TIMEOUT", "5");
            std::env::set_var("MAGNETDAV_AUTH_ENABLED", "true");
            std::env::set_var("MAGNETDAV_USERNAME", "viewer");
        }

        let config = MagnetdavConfig::from_env();

        assert_eq!(config.server.port, 8123);
        assert_eq!(config.swarm.metadata_timeout, Duration::from_secs(5));
        assert!(config.auth.enabled);
        assert_eq!(config.auth.username, "viewer");

        // Cleanup
        unsafe {
            std::env::remove_var("MAGNETDAV_PORT");
            std::env::remove_var("MAGNETDAV_METADATA_TIMEOUT");
            std::env::remove_var("MAGNETDAV_AUTH_ENABLED");
            std::env::remove_var("MAGNETDAV_USERNAME");
        }
    }
}

//! Magnetdav Core - swarm-backed content served as seekable files
//!
//! This crate provides the building blocks for exposing magnet-linked content
//! over HTTP: the swarm engine contract, the persistent file catalog, the
//! session lifecycle, catalog reconciliation and range streaming.

pub mod catalog;
pub mod config;
pub mod content;
pub mod media;
pub mod session;
pub mod streaming;
pub mod swarm;
pub mod sync;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use catalog::{CatalogError, CatalogStore, SqliteCatalog};
pub use config::MagnetdavConfig;
pub use content::{ContentId, ContentRecord, ContentStatus, FileEntry};
pub use session::{LifecycleError, LifecycleManager};
pub use streaming::{StreamingError, StreamingHandler};
pub use swarm::{SimulatedSwarm, SwarmEngine, SwarmError, SwarmSession};
pub use sync::{MetadataSynchronizer, SyncReport};

/// Core errors that can bubble up from any Magnetdav subsystem.
#[derive(Debug, thiserror::Error)]
pub enum MagnetdavError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Swarm error: {0}")]
    Swarm(#[from] SwarmError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Streaming error: {0}")]
    Streaming(#[from] StreamingError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MagnetdavError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            MagnetdavError::Streaming(e) => match e {
                StreamingError::NotFound { id } => format!("Content {id} not found"),
                StreamingError::NotReady { id } => format!("Content {id} is still loading"),
                StreamingError::FileNotFound { path, .. } => format!("File {path} not found"),
                _ => "Streaming error occurred".to_string(),
            },
            MagnetdavError::Swarm(SwarmError::Rejected { reason, .. }) => {
                format!("Link rejected: {reason}")
            }
            MagnetdavError::Swarm(_) => "Swarm error occurred".to_string(),
            MagnetdavError::Catalog(_) => "Catalog error occurred".to_string(),
            MagnetdavError::Lifecycle(LifecycleError::ShuttingDown) => {
                "Server is shutting down".to_string()
            }
            MagnetdavError::Lifecycle(_) => "Catalog error occurred".to_string(),
            MagnetdavError::Configuration { reason } => format!("Configuration error: {reason}"),
            MagnetdavError::Io(_) => "File system error occurred".to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MagnetdavError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages() {
        let err = MagnetdavError::from(StreamingError::NotReady {
            id: ContentId::new("abc"),
        });
        assert_eq!(err.user_message(), "Content abc is still loading");

        let err = MagnetdavError::from(LifecycleError::ShuttingDown);
        assert_eq!(err.user_message(), "Server is shutting down");
    }
}

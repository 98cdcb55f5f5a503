//! Contract with the external swarm engine.
//!
//! The engine fetches content metadata and file bytes from peers; the rest of
//! the crate only sees sessions, their reported file lists and seekable
//! readers over individual files.

pub mod simulated;

use std::sync::Arc;

use async_trait::async_trait;
pub use simulated::{MetadataBehavior, SimulatedContent, SimulatedFile, SimulatedSwarm};
use tokio::io::AsyncRead;

use crate::content::ContentId;

/// One file as reported by the swarm, in the swarm's own order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwarmFile {
    /// Path relative to the content root, `/`-separated.
    pub path: String,
    pub length: u64,
}

/// Metadata of a session once the swarm has resolved it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub name: String,
    pub total_length: u64,
    pub files: Vec<SwarmFile>,
}

impl SessionInfo {
    /// Finds a file by relative path, returning its position in the list.
    pub fn find_file(&self, path: &str) -> Option<(usize, &SwarmFile)> {
        self.files
            .iter()
            .enumerate()
            .find(|(_, file)| file.path == path)
    }
}

/// Starts retrieval sessions for content identifiers.
#[async_trait]
pub trait SwarmEngine: Send + Sync {
    /// Begins retrieving the content behind `uri`.
    ///
    /// Returns as soon as a session exists; metadata may arrive later.
    ///
    /// # Errors
    ///
    /// - `SwarmError::Rejected` - If the engine refuses the link
    async fn acquire(
        &self,
        id: &ContentId,
        uri: &str,
    ) -> Result<Arc<dyn SwarmSession>, SwarmError>;
}

/// Live retrieval session for one content identifier.
#[async_trait]
pub trait SwarmSession: Send + Sync {
    /// Identifier this session retrieves.
    fn id(&self) -> &ContentId;

    /// Resolves once metadata is available. Pends forever if it never is.
    async fn metadata_ready(&self);

    /// Metadata, or `None` while it is still being fetched.
    fn info(&self) -> Option<Arc<SessionInfo>>;

    /// Opens a reader over one file positioned at byte `start`.
    ///
    /// # Errors
    ///
    /// - `SwarmError::SessionClosed` - If the session was closed
    /// - `SwarmError::MetadataUnavailable` - If metadata has not arrived yet
    /// - `SwarmError::FileIndex` - If `file_index` is outside the file list
    /// - `SwarmError::Io` - If the underlying storage cannot be read
    async fn open_reader(
        &self,
        file_index: usize,
        start: u64,
    ) -> Result<Box<dyn SwarmReader>, SwarmError>;

    /// Releases swarm resources. Open readers fail on their next read.
    fn close(&self);
}

/// Sequential reader over a file inside a session.
pub trait SwarmReader: AsyncRead + Send + Unpin {
    /// Hints how many bytes ahead of the read position should be fetched.
    fn set_readahead(&mut self, bytes: u64);
}

/// Errors raised by swarm engines and sessions.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error("Swarm rejected {id}: {reason}")]
    Rejected { id: ContentId, reason: String },

    #[error("Session {id} is closed")]
    SessionClosed { id: ContentId },

    #[error("Metadata for {id} is not available yet")]
    MetadataUnavailable { id: ContentId },

    #[error("File index {index} out of range for {id}")]
    FileIndex { id: ContentId, index: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

//! Range streaming of swarm files over HTTP.

pub mod cache;
pub mod handler;
pub mod range;

pub use cache::{CacheHeaders, CachePolicy, if_none_match, validator};
pub use handler::{DirectoryListing, ListingEntry, ResolvedFile, StreamRequest, StreamingHandler};
pub use range::{ByteRangeRequest, ResolvedRange, UnsatisfiableRange, normalize};

use crate::catalog::CatalogError;
use crate::content::ContentId;
use crate::swarm::SwarmError;

/// Errors raised while resolving or serving a file request.
#[derive(Debug, thiserror::Error)]
pub enum StreamingError {
    #[error("Content {id} not found")]
    NotFound { id: ContentId },

    #[error("Content {id} is not ready")]
    NotReady { id: ContentId },

    #[error("File {path} not found in {id}")]
    FileNotFound { id: ContentId, path: String },

    #[error("Range starting at {start} not satisfiable for length {total}")]
    RangeNotSatisfiable { start: u64, total: u64 },

    #[error("Swarm error: {0}")]
    Swarm(#[from] SwarmError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

//! Persistent catalog of content records and their file entries.
//!
//! Defines the storage interface used by the lifecycle manager and the
//! metadata synchronizer, with a SQLite-backed implementation.

pub mod sqlite;

use async_trait::async_trait;
pub use sqlite::SqliteCatalog;

use crate::content::{
    ContentId, ContentRecord, ContentStatus, ContentSummary, FileEntry, NewFileEntry,
};

/// Persistence operations for content records and file entries.
///
/// Implementations must make `insert_record` atomic with respect to other
/// submitters of the same identifier and apply bulk file changes set-wise.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Loads the record for an identifier.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Database` - If the query failed
    async fn get_record(&self, id: &ContentId) -> Result<Option<ContentRecord>, CatalogError>;

    /// Inserts a record unless one already exists for its identifier.
    ///
    /// Returns the stored record in either case.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Database` - If the insert or follow-up read failed
    async fn insert_record(&self, record: ContentRecord) -> Result<Insertion, CatalogError>;

    /// Lists all records, most recently accessed first.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Database` - If the query failed
    async fn list_records(&self) -> Result<Vec<ContentRecord>, CatalogError>;

    /// Lists records currently in the given status.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Database` - If the query failed
    async fn records_with_status(
        &self,
        status: ContentStatus,
    ) -> Result<Vec<ContentRecord>, CatalogError>;

    /// Writes the metadata summary and moves the record to `ready`.
    ///
    /// Returns false when no record exists for the identifier.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Database` - If the update failed
    async fn mark_ready(
        &self,
        id: &ContentId,
        summary: &ContentSummary,
    ) -> Result<bool, CatalogError>;

    /// Moves the record to `error` with a diagnostic reason.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Database` - If the update failed
    async fn mark_error(&self, id: &ContentId, reason: &str) -> Result<bool, CatalogError>;

    /// Increments the access count and stamps the last access time.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Database` - If the update failed
    async fn record_access(&self, id: &ContentId) -> Result<(), CatalogError>;

    /// Deletes a record together with its file entries.
    ///
    /// Returns false when nothing was stored for the identifier.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Database` - If the transaction failed
    async fn remove_record(&self, id: &ContentId) -> Result<bool, CatalogError>;

    /// Lists file entries of a record ordered by file index.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Database` - If the query failed
    async fn files_for(&self, id: &ContentId) -> Result<Vec<FileEntry>, CatalogError>;

    /// Inserts a batch of file entries in one transaction.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Database` - If any insert failed; the batch is rolled back
    async fn insert_files(&self, files: Vec<NewFileEntry>) -> Result<usize, CatalogError>;

    /// Rewrites size, index and media type of an existing entry.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Database` - If the update failed
    async fn update_file(&self, file: &FileEntry) -> Result<(), CatalogError>;

    /// Deletes a batch of file entries by surrogate id in one transaction.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Database` - If any delete failed; the batch is rolled back
    async fn delete_files(&self, ids: Vec<i64>) -> Result<usize, CatalogError>;

    /// Counts records and file entries.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Database` - If the query failed
    async fn stats(&self) -> Result<CatalogStats, CatalogError>;
}

/// Outcome of an insert-if-absent.
#[derive(Debug, Clone, PartialEq)]
pub enum Insertion {
    /// The record was stored by this call.
    Created(ContentRecord),
    /// A record already existed and is returned unchanged.
    Existing(ContentRecord),
}

impl Insertion {
    /// Returns the stored record regardless of who created it.
    pub fn into_record(self) -> ContentRecord {
        match self {
            Insertion::Created(record) | Insertion::Existing(record) => record,
        }
    }
}

/// Row counts across the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub total_records: u64,
    pub total_files: u64,
}

/// Errors raised by catalog storage.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Catalog task failed: {reason}")]
    TaskJoin { reason: String },

    #[error("Record {id} not found")]
    RecordNotFound { id: ContentId },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

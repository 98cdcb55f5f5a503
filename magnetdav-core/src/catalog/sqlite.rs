//! SQLite catalog backed by rusqlite.
//!
//! A single connection is shared behind a mutex and every call is moved onto
//! the blocking pool so async executors never wait on disk I/O.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::{CatalogError, CatalogStats, CatalogStore, Insertion};
use crate::content::{
    ContentId, ContentRecord, ContentStatus, ContentSummary, FileEntry, NewFileEntry,
};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS contents (
      id TEXT PRIMARY KEY,
      source_uri TEXT NOT NULL,
      name TEXT NOT NULL DEFAULT '',
      total_size INTEGER NOT NULL DEFAULT 0,
      file_count INTEGER NOT NULL DEFAULT 0,
      status TEXT NOT NULL DEFAULT 'pending',
      error_message TEXT,
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL,
      last_accessed TEXT NOT NULL,
      access_count INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_contents_status ON contents(status);
    CREATE INDEX IF NOT EXISTS idx_contents_last_accessed ON contents(last_accessed);

    CREATE TABLE IF NOT EXISTS files (
      id INTEGER PRIMARY KEY AUTOINCREMENT,
      content_id TEXT NOT NULL REFERENCES contents(id) ON DELETE CASCADE,
      path TEXT NOT NULL,
      name TEXT NOT NULL,
      size INTEGER NOT NULL DEFAULT 0,
      file_index INTEGER NOT NULL DEFAULT 0,
      media_type TEXT NOT NULL,
      created_at TEXT NOT NULL,
      updated_at TEXT NOT NULL,
      UNIQUE(content_id, path)
    );
    CREATE INDEX IF NOT EXISTS idx_files_content ON files(content_id);
"#;

const RECORD_COLUMNS: &str = "id, source_uri, name, total_size, file_count, status, \
     error_message, created_at, updated_at, last_accessed, access_count";

const FILE_COLUMNS: &str =
    "id, content_id, path, name, size, file_index, media_type, created_at, updated_at";

/// Catalog stored in a SQLite database file.
#[derive(Clone)]
pub struct SqliteCatalog {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCatalog {
    /// Opens (creating if needed) the database at `path`.
    ///
    /// Enables WAL journaling, foreign keys and the given busy timeout, then
    /// creates the schema if it is missing.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Io` - If the parent directory cannot be created
    /// - `CatalogError::Database` - If the database cannot be opened or initialized
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(busy_timeout)?;
        Self::initialize(conn)
    }

    /// Opens a private in-memory database, used by tests and dry runs.
    ///
    /// # Errors
    ///
    /// - `CatalogError::Database` - If the schema cannot be created
    pub fn open_in_memory() -> Result<Self, CatalogError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, CatalogError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `operation` against the connection on the blocking pool.
    async fn with_connection<T, F>(&self, operation: F) -> Result<T, CatalogError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            operation(&mut guard)
        })
        .await
        .map_err(|e| CatalogError::TaskJoin {
            reason: e.to_string(),
        })?
        .map_err(CatalogError::from)
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn get_record(&self, id: &ContentId) -> Result<Option<ContentRecord>, CatalogError> {
        let id = id.clone();
        self.with_connection(move |conn| load_record(conn, &id))
            .await
    }

    async fn insert_record(&self, record: ContentRecord) -> Result<Insertion, CatalogError> {
        self.with_connection(move |conn| {
            let inserted = conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO contents ({RECORD_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
                ),
                params![
                    record.id.as_str(),
                    record.source_uri,
                    record.name,
                    record.total_size as i64,
                    record.file_count,
                    record.status.as_str(),
                    record.error_message,
                    record.created_at,
                    record.updated_at,
                    record.last_accessed,
                    record.access_count as i64,
                ],
            )?;

            if inserted == 1 {
                return Ok(Insertion::Created(record));
            }
            match load_record(conn, &record.id)? {
                Some(existing) => Ok(Insertion::Existing(existing)),
                // Removed between the ignored insert and the read.
                None => Err(rusqlite::Error::QueryReturnedNoRows),
            }
        })
        .await
    }

    async fn list_records(&self) -> Result<Vec<ContentRecord>, CatalogError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM contents \
                 ORDER BY last_accessed DESC, created_at DESC, id"
            ))?;
            let rows = stmt.query_map([], record_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn records_with_status(
        &self,
        status: ContentStatus,
    ) -> Result<Vec<ContentRecord>, CatalogError> {
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM contents WHERE status = ?1 ORDER BY created_at, id"
            ))?;
            let rows = stmt.query_map([status.as_str()], record_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn mark_ready(
        &self,
        id: &ContentId,
        summary: &ContentSummary,
    ) -> Result<bool, CatalogError> {
        let id = id.clone();
        let summary = summary.clone();
        self.with_connection(move |conn| {
            let changed = conn.execute(
                "UPDATE contents SET name = ?2, total_size = ?3, file_count = ?4, \
                 status = ?5, error_message = NULL, updated_at = ?6 WHERE id = ?1",
                params![
                    id.as_str(),
                    summary.name,
                    summary.total_size as i64,
                    summary.file_count,
                    ContentStatus::Ready.as_str(),
                    Utc::now(),
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn mark_error(&self, id: &ContentId, reason: &str) -> Result<bool, CatalogError> {
        let id = id.clone();
        let reason = reason.to_string();
        self.with_connection(move |conn| {
            let changed = conn.execute(
                "UPDATE contents SET status = ?2, error_message = ?3, updated_at = ?4 \
                 WHERE id = ?1",
                params![id.as_str(), ContentStatus::Error.as_str(), reason, Utc::now()],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn record_access(&self, id: &ContentId) -> Result<(), CatalogError> {
        let id = id.clone();
        self.with_connection(move |conn| {
            conn.execute(
                "UPDATE contents SET access_count = access_count + 1, last_accessed = ?2 \
                 WHERE id = ?1",
                params![id.as_str(), Utc::now()],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove_record(&self, id: &ContentId) -> Result<bool, CatalogError> {
        let id = id.clone();
        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM files WHERE content_id = ?1", [id.as_str()])?;
            let removed = tx.execute("DELETE FROM contents WHERE id = ?1", [id.as_str()])?;
            tx.commit()?;
            Ok(removed > 0)
        })
        .await
    }

    async fn files_for(&self, id: &ContentId) -> Result<Vec<FileEntry>, CatalogError> {
        let id = id.clone();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FILE_COLUMNS} FROM files WHERE content_id = ?1 ORDER BY file_index, id"
            ))?;
            let rows = stmt.query_map([id.as_str()], file_from_row)?;
            rows.collect()
        })
        .await
    }

    async fn insert_files(&self, files: Vec<NewFileEntry>) -> Result<usize, CatalogError> {
        if files.is_empty() {
            return Ok(0);
        }

        self.with_connection(move |conn| {
            let now = Utc::now();
            let tx = conn.transaction()?;
            let mut written = 0;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO files \
                     (content_id, path, name, size, file_index, media_type, created_at, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7) \
                     ON CONFLICT(content_id, path) DO UPDATE SET \
                       size = excluded.size, \
                       file_index = excluded.file_index, \
                       media_type = excluded.media_type, \
                       updated_at = excluded.updated_at",
                )?;
                for file in &files {
                    written += stmt.execute(params![
                        file.content_id.as_str(),
                        file.path,
                        file.name,
                        file.size as i64,
                        file.file_index,
                        file.media_type,
                        now,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(written)
        })
        .await
    }

    async fn update_file(&self, file: &FileEntry) -> Result<(), CatalogError> {
        let file = file.clone();
        self.with_connection(move |conn| {
            conn.execute(
                "UPDATE files SET size = ?2, file_index = ?3, media_type = ?4, updated_at = ?5 \
                 WHERE id = ?1",
                params![
                    file.id,
                    file.size as i64,
                    file.file_index,
                    file.media_type,
                    Utc::now(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_files(&self, ids: Vec<i64>) -> Result<usize, CatalogError> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.with_connection(move |conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            {
                let mut stmt = tx.prepare("DELETE FROM files WHERE id = ?1")?;
                for id in &ids {
                    removed += stmt.execute([id])?;
                }
            }
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    async fn stats(&self) -> Result<CatalogStats, CatalogError> {
        self.with_connection(|conn| {
            let total_records: i64 =
                conn.query_row("SELECT COUNT(*) FROM contents", [], |row| row.get(0))?;
            let total_files: i64 =
                conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
            Ok(CatalogStats {
                total_records: total_records as u64,
                total_files: total_files as u64,
            })
        })
        .await
    }
}

fn load_record(conn: &Connection, id: &ContentId) -> Result<Option<ContentRecord>, rusqlite::Error> {
    conn.query_row(
        &format!("SELECT {RECORD_COLUMNS} FROM contents WHERE id = ?1"),
        [id.as_str()],
        record_from_row,
    )
    .optional()
}

fn record_from_row(row: &Row<'_>) -> Result<ContentRecord, rusqlite::Error> {
    let status: String = row.get(5)?;
    let status = status
        .parse::<ContentStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;

    Ok(ContentRecord {
        id: ContentId::new(row.get::<_, String>(0)?),
        source_uri: row.get(1)?,
        name: row.get(2)?,
        total_size: row.get::<_, i64>(3)? as u64,
        file_count: row.get(4)?,
        status,
        error_message: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        last_accessed: row.get(9)?,
        access_count: row.get::<_, i64>(10)? as u64,
    })
}

fn file_from_row(row: &Row<'_>) -> Result<FileEntry, rusqlite::Error> {
    Ok(FileEntry {
        id: row.get(0)?,
        content_id: ContentId::new(row.get::<_, String>(1)?),
        path: row.get(2)?,
        name: row.get(3)?,
        size: row.get::<_, i64>(4)? as u64,
        file_index: row.get(5)?,
        media_type: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn pending(id: &str) -> ContentRecord {
        ContentRecord::pending(ContentId::new(id), &format!("magnet:?xt=urn:btih:{id}"))
    }

    fn staged(id: &str, path: &str, size: u64, index: u32) -> NewFileEntry {
        NewFileEntry::new(ContentId::new(id), path, size, index)
    }

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();

        let first = catalog.insert_record(pending("aa")).await.unwrap();
        assert!(matches!(first, Insertion::Created(_)));

        let mut changed = pending("aa");
        changed.name = "different".to_string();
        let second = catalog.insert_record(changed).await.unwrap();
        match second {
            Insertion::Existing(record) => assert_eq!(record.name, ""),
            other => panic!("expected existing record, got {other:?}"),
        }

        assert_eq!(catalog.stats().await.unwrap().total_records, 1);
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let id = ContentId::new("bb");
        catalog.insert_record(pending("bb")).await.unwrap();

        assert!(catalog.mark_error(&id, "metadata timeout").await.unwrap());
        let record = catalog.get_record(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ContentStatus::Error);
        assert_eq!(record.error_message.as_deref(), Some("metadata timeout"));

        let summary = ContentSummary {
            name: "Movie".to_string(),
            total_size: 1234,
            file_count: 2,
        };
        assert!(catalog.mark_ready(&id, &summary).await.unwrap());
        let record = catalog.get_record(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ContentStatus::Ready);
        assert_eq!(record.error_message, None);
        assert_eq!(record.total_size, 1234);
        assert_eq!(record.file_count, 2);

        assert!(
            !catalog
                .mark_ready(&ContentId::new("missing"), &summary)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_record_access_counts() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let id = ContentId::new("cc");
        let created = catalog.insert_record(pending("cc")).await.unwrap().into_record();

        catalog.record_access(&id).await.unwrap();
        catalog.record_access(&id).await.unwrap();

        let record = catalog.get_record(&id).await.unwrap().unwrap();
        assert_eq!(record.access_count, 2);
        assert!(record.last_accessed >= created.last_accessed);
    }

    #[tokio::test]
    async fn test_files_ordered_by_index_and_removed_with_record() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let id = ContentId::new("dd");
        catalog.insert_record(pending("dd")).await.unwrap();

        let written = catalog
            .insert_files(vec![
                staged("dd", "b.mkv", 20, 1),
                staged("dd", "a.srt", 10, 0),
            ])
            .await
            .unwrap();
        assert_eq!(written, 2);

        let files = catalog.files_for(&id).await.unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["a.srt", "b.mkv"]);

        assert!(catalog.remove_record(&id).await.unwrap());
        assert!(catalog.get_record(&id).await.unwrap().is_none());
        assert!(catalog.files_for(&id).await.unwrap().is_empty());
        assert!(!catalog.remove_record(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_and_delete_files() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let id = ContentId::new("ee");
        catalog.insert_record(pending("ee")).await.unwrap();
        catalog
            .insert_files(vec![staged("ee", "a", 1, 0), staged("ee", "b", 2, 1)])
            .await
            .unwrap();

        let mut files = catalog.files_for(&id).await.unwrap();
        let mut first = files.remove(0);
        first.size = 99;
        first.file_index = 5;
        catalog.update_file(&first).await.unwrap();

        let removed = catalog.delete_files(vec![files[0].id]).await.unwrap();
        assert_eq!(removed, 1);

        let files = catalog.files_for(&id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, 99);
        assert_eq!(files[0].file_index, 5);
    }

    #[tokio::test]
    async fn test_duplicate_file_insert_upserts() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        let id = ContentId::new("ff");
        catalog.insert_record(pending("ff")).await.unwrap();

        catalog.insert_files(vec![staged("ff", "a", 1, 0)]).await.unwrap();
        catalog.insert_files(vec![staged("ff", "a", 7, 3)]).await.unwrap();

        let files = catalog.files_for(&id).await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, 7);
        assert_eq!(files[0].file_index, 3);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("catalog.db");

        {
            let catalog = SqliteCatalog::open(&path, Duration::from_secs(1)).unwrap();
            catalog.insert_record(pending("gg")).await.unwrap();
            catalog
                .mark_ready(
                    &ContentId::new("gg"),
                    &ContentSummary {
                        name: "Show".to_string(),
                        total_size: 10,
                        file_count: 1,
                    },
                )
                .await
                .unwrap();
        }

        let catalog = SqliteCatalog::open(&path, Duration::from_secs(1)).unwrap();
        let ready = catalog
            .records_with_status(ContentStatus::Ready)
            .await
            .unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].name, "Show");
    }

    #[tokio::test]
    async fn test_list_records_most_recent_first() {
        let catalog = SqliteCatalog::open_in_memory().unwrap();
        catalog.insert_record(pending("old")).await.unwrap();
        catalog.insert_record(pending("new")).await.unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        catalog.record_access(&ContentId::new("old")).await.unwrap();

        let records = catalog.list_records().await.unwrap();
        assert_eq!(records[0].id.as_str(), "old");
        assert_eq!(records.len(), 2);
    }
}

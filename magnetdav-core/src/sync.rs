//! Reconciles the persisted file catalog with swarm-reported metadata.
//!
//! The diff is computed by [`plan_reconciliation`] without touching storage;
//! [`MetadataSynchronizer`] applies it in independent batches.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, error, info};

use crate::catalog::{CatalogError, CatalogStore};
use crate::content::{ContentId, ContentSummary, FileEntry, NewFileEntry};
use crate::media::media_type_for;
use crate::swarm::{SessionInfo, SwarmFile};

/// Changes needed to make the catalog match a reported file list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconciliationPlan {
    pub creates: Vec<NewFileEntry>,
    /// Existing entries carrying their new size, index and media type.
    pub updates: Vec<FileEntry>,
    /// Entries whose path is no longer reported, in file index order.
    pub deletes: Vec<FileEntry>,
    /// Reported paths skipped because they appeared earlier in the list.
    pub duplicates: Vec<String>,
}

impl ReconciliationPlan {
    /// Returns true when the catalog already matches the reported list.
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.creates.len() + self.updates.len() + self.deletes.len()
    }
}

/// Computes the diff between persisted entries and the reported file list.
///
/// The first occurrence of a path wins; its position becomes the entry's
/// file index.
pub fn plan_reconciliation(
    id: &ContentId,
    existing: Vec<FileEntry>,
    reported: &[SwarmFile],
) -> ReconciliationPlan {
    let mut remaining: HashMap<String, FileEntry> = existing
        .into_iter()
        .map(|entry| (entry.path.clone(), entry))
        .collect();
    let mut seen = HashSet::with_capacity(reported.len());
    let mut plan = ReconciliationPlan::default();

    for (position, file) in reported.iter().enumerate() {
        if !seen.insert(file.path.as_str()) {
            plan.duplicates.push(file.path.clone());
            continue;
        }

        let file_index = u32::try_from(position).unwrap_or(u32::MAX);
        match remaining.remove(&file.path) {
            None => plan
                .creates
                .push(NewFileEntry::new(id.clone(), &file.path, file.length, file_index)),
            Some(mut entry) => {
                let media_type = media_type_for(&file.path);
                if entry.size != file.length
                    || entry.file_index != file_index
                    || entry.media_type != media_type
                {
                    entry.size = file.length;
                    entry.file_index = file_index;
                    entry.media_type = media_type;
                    plan.updates.push(entry);
                }
            }
        }
    }

    plan.deletes = remaining.into_values().collect();
    plan.deletes
        .sort_by(|a, b| a.file_index.cmp(&b.file_index).then(a.id.cmp(&b.id)));
    plan
}

/// Counts of what one synchronization pass changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub duplicates_skipped: usize,
    pub failed_batches: usize,
}

/// Applies reconciliation plans to the catalog.
#[derive(Clone)]
pub struct MetadataSynchronizer {
    catalog: Arc<dyn CatalogStore>,
}

impl MetadataSynchronizer {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Marks the record ready and brings its file entries in line with `info`.
    ///
    /// Create, update and delete batches are applied independently; a failed
    /// batch is logged and counted in the report without undoing the others.
    ///
    /// # Errors
    ///
    /// - `CatalogError::RecordNotFound` - If the record was removed meanwhile
    /// - `CatalogError::Database` - If the record update or entry load failed
    pub async fn synchronize(
        &self,
        id: &ContentId,
        info: &SessionInfo,
    ) -> Result<SyncReport, CatalogError> {
        let summary = ContentSummary {
            name: info.name.clone(),
            total_size: info.total_length,
            file_count: u32::try_from(info.files.len()).unwrap_or(u32::MAX),
        };
        if !self.catalog.mark_ready(id, &summary).await? {
            return Err(CatalogError::RecordNotFound { id: id.clone() });
        }

        let existing = self.catalog.files_for(id).await?;
        let plan = plan_reconciliation(id, existing, &info.files);
        for path in &plan.duplicates {
            debug!("Skipping duplicate path {} reported for {}", path, id);
        }

        let mut report = SyncReport {
            duplicates_skipped: plan.duplicates.len(),
            ..SyncReport::default()
        };

        let creates = plan.creates.len();
        if creates > 0 {
            match self.catalog.insert_files(plan.creates).await {
                Ok(_) => {
                    report.created = creates;
                    info!("Created {} file entries for {}", creates, id);
                }
                Err(e) => {
                    report.failed_batches += 1;
                    error!("Failed to create {} file entries for {}: {}", creates, id, e);
                }
            }
        }

        if !plan.updates.is_empty() {
            let mut failed = 0;
            for entry in &plan.updates {
                if let Err(e) = self.catalog.update_file(entry).await {
                    failed += 1;
                    error!("Failed to update file entry {} for {}: {}", entry.path, id, e);
                }
            }
            report.updated = plan.updates.len() - failed;
            if failed > 0 {
                report.failed_batches += 1;
            }
            info!("Updated {} file entries for {}", report.updated, id);
        }

        let deletes = plan.deletes.len();
        if deletes > 0 {
            let ids = plan.deletes.iter().map(|entry| entry.id).collect();
            match self.catalog.delete_files(ids).await {
                Ok(_) => {
                    report.deleted = deletes;
                    info!("Deleted {} stale file entries for {}", deletes, id);
                }
                Err(e) => {
                    report.failed_batches += 1;
                    error!("Failed to delete {} file entries for {}: {}", deletes, id, e);
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use proptest::prelude::*;

    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::content::ContentRecord;

    fn reported(files: &[(&str, u64)]) -> Vec<SwarmFile> {
        files
            .iter()
            .map(|(path, length)| SwarmFile {
                path: path.to_string(),
                length: *length,
            })
            .collect()
    }

    fn persisted(id: &ContentId, files: &[(&str, u64)]) -> Vec<FileEntry> {
        files
            .iter()
            .enumerate()
            .map(|(index, (path, size))| FileEntry {
                id: index as i64 + 1,
                content_id: id.clone(),
                path: path.to_string(),
                name: path.to_string(),
                size: *size,
                file_index: index as u32,
                media_type: media_type_for(path),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .collect()
    }

    fn session_info(files: &[(&str, u64)]) -> SessionInfo {
        let files = reported(files);
        SessionInfo {
            name: "Content".to_string(),
            total_length: files.iter().map(|f| f.length).sum(),
            files,
        }
    }

    #[test]
    fn test_plan_creates_updates_and_deletes() {
        let id = ContentId::new("aa");
        let existing = persisted(&id, &[("a", 10), ("b", 20)]);

        let plan = plan_reconciliation(&id, existing, &reported(&[("b", 25), ("c", 5)]));

        assert_eq!(plan.deletes.len(), 1);
        assert_eq!(plan.deletes[0].path, "a");
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].path, "b");
        assert_eq!(plan.updates[0].size, 25);
        assert_eq!(plan.updates[0].file_index, 0);
        assert_eq!(plan.creates.len(), 1);
        assert_eq!(plan.creates[0].path, "c");
        assert_eq!(plan.creates[0].size, 5);
        assert_eq!(plan.creates[0].file_index, 1);
    }

    #[test]
    fn test_plan_keeps_first_duplicate() {
        let id = ContentId::new("aa");
        let plan = plan_reconciliation(
            &id,
            Vec::new(),
            &reported(&[("x.mkv", 1), ("y", 2), ("x.mkv", 3)]),
        );

        assert_eq!(plan.creates.len(), 2);
        assert_eq!(plan.creates[0].path, "x.mkv");
        assert_eq!(plan.creates[0].size, 1);
        assert_eq!(plan.creates[0].file_index, 0);
        assert_eq!(plan.duplicates, vec!["x.mkv".to_string()]);
    }

    #[test]
    fn test_plan_detects_reordering() {
        let id = ContentId::new("aa");
        let existing = persisted(&id, &[("a", 1), ("b", 2)]);

        let plan = plan_reconciliation(&id, existing, &reported(&[("b", 2), ("a", 1)]));

        assert_eq!(plan.updates.len(), 2);
        assert!(plan.creates.is_empty());
        assert!(plan.deletes.is_empty());
    }

    #[tokio::test]
    async fn test_synchronize_applies_and_converges() {
        let catalog = Arc::new(SqliteCatalog::open_in_memory().unwrap());
        let id = ContentId::new("aa");
        catalog
            .insert_record(ContentRecord::pending(id.clone(), "magnet:?xt=urn:btih:aa"))
            .await
            .unwrap();
        let synchronizer = MetadataSynchronizer::new(catalog.clone());

        let first = synchronizer
            .synchronize(&id, &session_info(&[("a", 10), ("b", 20)]))
            .await
            .unwrap();
        assert_eq!(first.created, 2);

        let second = synchronizer
            .synchronize(&id, &session_info(&[("b", 25), ("c", 5)]))
            .await
            .unwrap();
        assert_eq!((second.created, second.updated, second.deleted), (1, 1, 1));

        let files = catalog.files_for(&id).await.unwrap();
        let state: Vec<_> = files
            .iter()
            .map(|f| (f.path.as_str(), f.size, f.file_index))
            .collect();
        assert_eq!(state, [("b", 25, 0), ("c", 5, 1)]);

        let third = synchronizer
            .synchronize(&id, &session_info(&[("b", 25), ("c", 5)]))
            .await
            .unwrap();
        assert_eq!(third, SyncReport::default());

        let record = catalog.get_record(&id).await.unwrap().unwrap();
        assert!(record.is_ready());
        assert_eq!(record.total_size, 30);
        assert_eq!(record.file_count, 2);
    }

    #[tokio::test]
    async fn test_synchronize_missing_record() {
        let catalog = Arc::new(SqliteCatalog::open_in_memory().unwrap());
        let synchronizer = MetadataSynchronizer::new(catalog);

        let result = synchronizer
            .synchronize(&ContentId::new("gone"), &session_info(&[("a", 1)]))
            .await;
        assert!(matches!(result, Err(CatalogError::RecordNotFound { .. })));
    }

    fn apply(id: &ContentId, existing: Vec<FileEntry>, plan: ReconciliationPlan) -> Vec<FileEntry> {
        let deleted: HashSet<i64> = plan.deletes.iter().map(|e| e.id).collect();
        let mut next_id = existing.iter().map(|e| e.id).max().unwrap_or(0);
        let mut state: HashMap<String, FileEntry> = existing
            .into_iter()
            .filter(|e| !deleted.contains(&e.id))
            .map(|e| (e.path.clone(), e))
            .collect();
        for entry in plan.updates {
            state.insert(entry.path.clone(), entry);
        }
        for new in plan.creates {
            next_id += 1;
            state.insert(
                new.path.clone(),
                FileEntry {
                    id: next_id,
                    content_id: id.clone(),
                    path: new.path,
                    name: new.name,
                    size: new.size,
                    file_index: new.file_index,
                    media_type: new.media_type,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                },
            );
        }
        state.into_values().collect()
    }

    fn file_lists() -> impl Strategy<Value = Vec<(String, u64)>> {
        prop::collection::vec(("[a-d]{1,2}(\\.mkv)?", 0u64..100), 0..12)
    }

    proptest! {
        #[test]
        fn prop_second_pass_is_empty(before in file_lists(), after in file_lists()) {
            let id = ContentId::new("pp");
            let before: Vec<SwarmFile> = before
                .into_iter()
                .map(|(path, length)| SwarmFile { path, length })
                .collect();
            let after: Vec<SwarmFile> = after
                .into_iter()
                .map(|(path, length)| SwarmFile { path, length })
                .collect();

            let seeded = apply(&id, Vec::new(), plan_reconciliation(&id, Vec::new(), &before));
            let plan = plan_reconciliation(&id, seeded.clone(), &after);
            let converged = apply(&id, seeded, plan);

            let unique: HashSet<&str> = after.iter().map(|f| f.path.as_str()).collect();
            prop_assert_eq!(converged.len(), unique.len());

            let again = plan_reconciliation(&id, converged, &after);
            prop_assert!(again.is_empty());
        }
    }
}

//! Drives content from submission to a live, catalogued session.
//!
//! Submission persists a pending record and hands acquisition to a background
//! task. The task races metadata arrival against a timeout and the shutdown
//! signal, then either registers the session and reconciles the catalog or
//! records the failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::registry::{Registration, SessionRegistry};
use crate::catalog::{CatalogError, CatalogStore, Insertion};
use crate::content::{ContentId, ContentRecord, ContentStatus};
use crate::swarm::{SwarmEngine, SwarmSession};
use crate::sync::MetadataSynchronizer;

/// Failure reason stored when metadata does not arrive in time.
pub const METADATA_TIMEOUT_REASON: &str = "metadata timeout";

/// Errors returned by lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Lifecycle manager is shutting down")]
    ShuttingDown,
}

/// Counts reported by the stats endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    pub total_records: u64,
    pub total_files: u64,
    pub active_sessions: usize,
}

enum Outcome {
    Ready,
    TimedOut,
    Shutdown,
}

struct ManagerInner {
    catalog: Arc<dyn CatalogStore>,
    engine: Arc<dyn SwarmEngine>,
    registry: SessionRegistry,
    synchronizer: MetadataSynchronizer,
    metadata_timeout: Duration,
    shutdown: watch::Sender<bool>,
    in_flight: watch::Sender<usize>,
}

/// Owns live sessions and the pending/ready/error lifecycle of records.
///
/// Cheap to clone; all clones share the same registry and shutdown signal.
#[derive(Clone)]
pub struct LifecycleManager {
    inner: Arc<ManagerInner>,
}

impl LifecycleManager {
    /// Creates a manager over the given catalog and swarm engine.
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        engine: Arc<dyn SwarmEngine>,
        metadata_timeout: Duration,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        let (in_flight, _) = watch::channel(0);
        Self {
            inner: Arc::new(ManagerInner {
                synchronizer: MetadataSynchronizer::new(Arc::clone(&catalog)),
                catalog,
                engine,
                registry: SessionRegistry::new(),
                metadata_timeout,
                shutdown,
                in_flight,
            }),
        }
    }

    /// Catalog shared with the manager.
    pub fn catalog(&self) -> &Arc<dyn CatalogStore> {
        &self.inner.catalog
    }

    /// Submits a link, returning its stored record.
    ///
    /// A link seen before returns its record unchanged. A new link is stored
    /// as pending and acquisition starts in the background.
    ///
    /// # Errors
    ///
    /// - `LifecycleError::ShuttingDown` - If `shutdown` has been called
    /// - `LifecycleError::Catalog` - If the record cannot be read or stored
    pub async fn submit(&self, uri: &str) -> Result<ContentRecord, LifecycleError> {
        if self.is_shutting_down() {
            return Err(LifecycleError::ShuttingDown);
        }

        let id = ContentId::from_uri(uri);
        if let Some(existing) = self.inner.catalog.get_record(&id).await? {
            debug!("Content {} already submitted ({})", id, existing.status);
            return Ok(existing);
        }

        match self
            .inner
            .catalog
            .insert_record(ContentRecord::pending(id.clone(), uri))
            .await?
        {
            Insertion::Existing(existing) => Ok(existing),
            Insertion::Created(record) => {
                info!("Submitted content {}", id);
                self.spawn_acquisition(id, uri.to_string());
                Ok(record)
            }
        }
    }

    /// Returns the live session for `id`.
    pub fn lookup(&self, id: &ContentId) -> Option<Arc<dyn SwarmSession>> {
        self.inner.registry.lookup(id)
    }

    /// Records an access in the background; failures are only logged.
    pub fn record_access(&self, id: &ContentId) {
        let catalog = Arc::clone(&self.inner.catalog);
        let id = id.clone();
        tokio::spawn(async move {
            if let Err(e) = catalog.record_access(&id).await {
                warn!("Failed to record access for {}: {}", id, e);
            }
        });
    }

    /// Restarts acquisition for every record that was ready.
    ///
    /// Returns how many acquisitions were started.
    ///
    /// # Errors
    ///
    /// - `LifecycleError::ShuttingDown` - If `shutdown` has been called
    /// - `LifecycleError::Catalog` - If ready records cannot be listed
    pub async fn recover(&self) -> Result<usize, LifecycleError> {
        if self.is_shutting_down() {
            return Err(LifecycleError::ShuttingDown);
        }

        let records = self
            .inner
            .catalog
            .records_with_status(ContentStatus::Ready)
            .await?;
        let count = records.len();
        for record in records {
            self.spawn_acquisition(record.id, record.source_uri);
        }

        info!("Recovering {} ready records", count);
        Ok(count)
    }

    /// Drops the live session for `id` and deletes its record and files.
    ///
    /// Returns false when neither a session nor a record existed.
    ///
    /// # Errors
    ///
    /// - `LifecycleError::Catalog` - If the record cannot be deleted
    pub async fn remove(&self, id: &ContentId) -> Result<bool, LifecycleError> {
        let session = self.inner.registry.remove(id);
        let had_session = session.is_some();
        if let Some(session) = session {
            session.close();
        }

        let removed = self.inner.catalog.remove_record(id).await?;
        if removed || had_session {
            info!("Removed content {}", id);
        }
        Ok(removed || had_session)
    }

    /// Aborts pending acquisitions and closes every live session.
    ///
    /// Later registrations are refused. Calling it again has no effect.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);

        let sessions = self.inner.registry.close();
        let count = sessions.len();
        for session in sessions {
            session.close();
        }
        if count > 0 {
            info!("Closed {} sessions on shutdown", count);
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    /// Waits until no acquisition task is in flight.
    pub async fn settled(&self) {
        let mut in_flight = self.inner.in_flight.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = in_flight.wait_for(|count| *count == 0).await;
    }

    pub fn active_session_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Catalog counts plus the number of live sessions.
    ///
    /// # Errors
    ///
    /// - `LifecycleError::Catalog` - If the counts cannot be read
    pub async fn stats(&self) -> Result<ManagerStats, LifecycleError> {
        let catalog = self.inner.catalog.stats().await?;
        Ok(ManagerStats {
            total_records: catalog.total_records,
            total_files: catalog.total_files,
            active_sessions: self.active_session_count(),
        })
    }

    fn spawn_acquisition(&self, id: ContentId, uri: String) {
        self.inner.in_flight.send_modify(|count| *count += 1);
        let guard = InFlight(Arc::clone(&self.inner));
        tokio::spawn(async move {
            guard.0.acquire(id, uri).await;
            drop(guard);
        });
    }
}

/// Decrements the in-flight count when an acquisition task ends.
struct InFlight(Arc<ManagerInner>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0
            .in_flight
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

impl ManagerInner {
    async fn acquire(&self, id: ContentId, uri: String) {
        let mut shutdown = self.shutdown.subscribe();
        let stopped = *shutdown.borrow();
        if stopped {
            return;
        }

        // One deadline covers both the engine call and metadata arrival
        let deadline = Instant::now() + self.metadata_timeout;

        let session = tokio::select! {
            result = self.engine.acquire(&id, &uri) => match result {
                Ok(session) => session,
                Err(e) => {
                    warn!("Swarm rejected {}: {}", id, e);
                    self.fail(&id, &e.to_string()).await;
                    return;
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                warn!(
                    "Swarm did not start a session for {} within {:?}",
                    id, self.metadata_timeout
                );
                self.fail(&id, METADATA_TIMEOUT_REASON).await;
                return;
            }
            _ = shutdown_requested(&mut shutdown) => {
                debug!("Acquisition of {} aborted by shutdown", id);
                return;
            }
        };

        let outcome = tokio::select! {
            _ = session.metadata_ready() => Outcome::Ready,
            _ = tokio::time::sleep_until(deadline) => Outcome::TimedOut,
            _ = shutdown_requested(&mut shutdown) => Outcome::Shutdown,
        };

        match outcome {
            Outcome::Ready => self.activate(id, session).await,
            Outcome::TimedOut => {
                warn!(
                    "Metadata for {} not received within {:?}",
                    id, self.metadata_timeout
                );
                session.close();
                self.fail(&id, METADATA_TIMEOUT_REASON).await;
            }
            Outcome::Shutdown => {
                debug!("Acquisition of {} aborted by shutdown", id);
                session.close();
            }
        }
    }

    async fn activate(&self, id: ContentId, session: Arc<dyn SwarmSession>) {
        let Some(info) = session.info() else {
            warn!("Session for {} signalled metadata without info", id);
            session.close();
            self.fail(&id, "metadata unavailable").await;
            return;
        };

        match self.catalog.get_record(&id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                debug!("Content {} was removed during acquisition", id);
                session.close();
                return;
            }
            Err(e) => warn!("Failed to check record for {}: {}", id, e),
        }

        match self.registry.register(id.clone(), Arc::clone(&session)) {
            Registration::Inserted => {}
            Registration::Replaced(previous) => {
                debug!("Replacing existing session for {}", id);
                previous.close();
            }
            Registration::Refused(session) => {
                debug!("Registry closed, dropping session for {}", id);
                session.close();
                return;
            }
        }

        info!(
            "Metadata received for {}: {} ({} files, {} bytes)",
            id,
            info.name,
            info.files.len(),
            info.total_length
        );

        match self.synchronizer.synchronize(&id, &info).await {
            Ok(report) => info!(
                "Synchronized {}: {} created, {} updated, {} deleted, {} duplicates",
                id, report.created, report.updated, report.deleted, report.duplicates_skipped
            ),
            Err(CatalogError::RecordNotFound { .. }) => {
                // Removed between the check above and registration
                debug!("Content {} was removed during synchronization", id);
                if self.registry.remove_session(&id, &session) {
                    session.close();
                }
            }
            Err(e) => error!("Failed to synchronize catalog for {}: {}", id, e),
        }
    }

    async fn fail(&self, id: &ContentId, reason: &str) {
        if let Err(e) = self.catalog.mark_error(id, reason).await {
            error!("Failed to record error for {}: {}", id, e);
        }
    }
}

/// Resolves once shutdown is signalled or the manager is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::swarm::{MetadataBehavior, SimulatedContent, SimulatedFile, SimulatedSwarm};

    fn manager(swarm: &SimulatedSwarm, timeout: Duration) -> LifecycleManager {
        let catalog = Arc::new(SqliteCatalog::open_in_memory().unwrap());
        LifecycleManager::new(catalog, Arc::new(swarm.clone()), timeout)
    }

    #[tokio::test]
    async fn test_submit_reaches_ready() {
        let swarm = SimulatedSwarm::new();
        let id = ContentId::new("aa");
        swarm.add_content(
            id.clone(),
            SimulatedContent::new("Movie")
                .with_file(SimulatedFile::in_memory("movie.mp4", vec![0u8; 100])),
        );
        let manager = manager(&swarm, Duration::from_secs(5));

        let record = manager.submit("magnet:?xt=urn:btih:AA").await.unwrap();
        assert_eq!(record.status, ContentStatus::Pending);

        manager.settled().await;
        let record = manager.catalog().get_record(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ContentStatus::Ready);
        assert_eq!(record.name, "Movie");
        assert!(manager.lookup(&id).is_some());
        assert_eq!(manager.catalog().files_for(&id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejection_marks_error() {
        let swarm = SimulatedSwarm::new();
        let id = ContentId::new("bad");
        swarm.reject(id.clone(), "blocked");
        let manager = manager(&swarm, Duration::from_secs(5));

        manager.submit("magnet:?xt=urn:btih:bad").await.unwrap();
        manager.settled().await;

        let record = manager.catalog().get_record(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ContentStatus::Error);
        assert!(record.error_message.unwrap().contains("blocked"));
        assert!(manager.lookup(&id).is_none());
    }

    #[tokio::test]
    async fn test_remove_drops_session_and_record() {
        let swarm = SimulatedSwarm::new();
        let id = ContentId::new("cc");
        swarm.add_content(id.clone(), SimulatedContent::new("C"));
        let manager = manager(&swarm, Duration::from_secs(5));

        manager.submit("magnet:?xt=urn:btih:cc").await.unwrap();
        manager.settled().await;
        assert_eq!(manager.active_session_count(), 1);

        assert!(manager.remove(&id).await.unwrap());
        assert!(manager.lookup(&id).is_none());
        assert!(manager.catalog().get_record(&id).await.unwrap().is_none());
        assert_eq!(swarm.open_session_count(), 0);
        assert!(!manager.remove(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_during_acquisition_leaves_no_session() {
        let swarm = SimulatedSwarm::new();
        let id = ContentId::new("c1");
        swarm.add_content(
            id.clone(),
            SimulatedContent::new("C1")
                .with_file(SimulatedFile::in_memory("movie.mp4", vec![0u8; 10]))
                .with_metadata(MetadataBehavior::Delayed(Duration::from_millis(50))),
        );
        let manager = manager(&swarm, Duration::from_secs(5));

        manager.submit("magnet:?xt=urn:btih:c1").await.unwrap();
        assert!(manager.remove(&id).await.unwrap());
        manager.settled().await;

        assert!(manager.catalog().get_record(&id).await.unwrap().is_none());
        assert!(manager.lookup(&id).is_none());
        assert_eq!(manager.active_session_count(), 0);
        assert_eq!(swarm.open_session_count(), 0);
    }

    /// Engine whose `acquire` never returns.
    struct StalledEngine;

    #[async_trait::async_trait]
    impl SwarmEngine for StalledEngine {
        async fn acquire(
            &self,
            _id: &ContentId,
            _uri: &str,
        ) -> Result<Arc<dyn SwarmSession>, crate::swarm::SwarmError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_stalled_engine_times_out() {
        let catalog = Arc::new(SqliteCatalog::open_in_memory().unwrap());
        let manager =
            LifecycleManager::new(catalog, Arc::new(StalledEngine), Duration::from_millis(50));
        let id = ContentId::new("c2");

        manager.submit("magnet:?xt=urn:btih:c2").await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), manager.settled())
            .await
            .unwrap();

        let record = manager.catalog().get_record(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ContentStatus::Error);
        assert_eq!(record.error_message.as_deref(), Some(METADATA_TIMEOUT_REASON));
        assert!(manager.lookup(&id).is_none());
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let swarm = SimulatedSwarm::new();
        let manager = manager(&swarm, Duration::from_secs(5));

        manager.shutdown();
        manager.shutdown();

        let result = manager.submit("magnet:?xt=urn:btih:dd").await;
        assert!(matches!(result, Err(LifecycleError::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_shutdown_aborts_pending_acquisition() {
        let swarm = SimulatedSwarm::new();
        let id = ContentId::new("ee");
        swarm.add_content(
            id.clone(),
            SimulatedContent::new("E").with_metadata(MetadataBehavior::Never),
        );
        let manager = manager(&swarm, Duration::from_secs(30));

        manager.submit("magnet:?xt=urn:btih:ee").await.unwrap();
        while swarm.acquisition_count() == 0 {
            tokio::task::yield_now().await;
        }

        manager.shutdown();
        tokio::time::timeout(Duration::from_secs(5), manager.settled())
            .await
            .unwrap();

        let record = manager.catalog().get_record(&id).await.unwrap().unwrap();
        assert_eq!(record.status, ContentStatus::Pending);
        assert!(manager.lookup(&id).is_none());
        assert_eq!(swarm.open_session_count(), 0);
    }

    #[tokio::test]
    async fn test_stats_counts_sessions_and_files() {
        let swarm = SimulatedSwarm::new();
        swarm.add_content(
            ContentId::new("ff"),
            SimulatedContent::new("F")
                .with_file(SimulatedFile::in_memory("a", vec![1u8; 3]))
                .with_file(SimulatedFile::in_memory("b", vec![1u8; 4])),
        );
        let manager = manager(&swarm, Duration::from_secs(5));

        manager.submit("magnet:?xt=urn:btih:ff").await.unwrap();
        manager.settled().await;

        let stats = manager.stats().await.unwrap();
        assert_eq!(stats.total_records, 1);
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.active_sessions, 1);
    }
}

//! In-process swarm engine for development and testing.
//!
//! Serves registered content from memory or local files with configurable
//! metadata behavior, so the server can run end-to-end without peers.

use std::collections::HashMap;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncRead, AsyncSeekExt, ReadBuf};
use tokio::sync::watch;
use tracing::{debug, info};

use super::{SessionInfo, SwarmEngine, SwarmError, SwarmFile, SwarmReader, SwarmSession};
use crate::content::ContentId;

/// When a simulated session reports its metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataBehavior {
    /// Metadata is available as soon as the session starts.
    Immediate,
    /// Metadata arrives after the given delay.
    Delayed(Duration),
    /// Metadata never arrives.
    Never,
}

#[derive(Debug, Clone)]
enum FileSource {
    Memory(Bytes),
    Disk(PathBuf),
}

/// One file of simulated content.
#[derive(Debug, Clone)]
pub struct SimulatedFile {
    path: String,
    length: u64,
    source: FileSource,
}

impl SimulatedFile {
    /// File served from an in-memory buffer.
    pub fn in_memory(path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            path: path.into(),
            length: data.len() as u64,
            source: FileSource::Memory(data),
        }
    }

    /// File served from a local file of known length.
    pub fn on_disk(path: impl Into<String>, disk_path: impl Into<PathBuf>, length: u64) -> Self {
        Self {
            path: path.into(),
            length,
            source: FileSource::Disk(disk_path.into()),
        }
    }
}

/// Content registered with a [`SimulatedSwarm`].
#[derive(Debug, Clone)]
pub struct SimulatedContent {
    name: String,
    files: Vec<SimulatedFile>,
    behavior: MetadataBehavior,
}

impl SimulatedContent {
    /// Creates content whose metadata resolves immediately.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            files: Vec::new(),
            behavior: MetadataBehavior::Immediate,
        }
    }

    /// Appends a file; the swarm reports files in insertion order.
    pub fn with_file(mut self, file: SimulatedFile) -> Self {
        self.files.push(file);
        self
    }

    /// Sets when metadata becomes available.
    pub fn with_metadata(mut self, behavior: MetadataBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    fn info(&self) -> SessionInfo {
        let files: Vec<SwarmFile> = self
            .files
            .iter()
            .map(|file| SwarmFile {
                path: file.path.clone(),
                length: file.length,
            })
            .collect();
        SessionInfo {
            name: self.name.clone(),
            total_length: files.iter().map(|file| file.length).sum(),
            files,
        }
    }
}

#[derive(Default)]
struct SwarmState {
    contents: RwLock<HashMap<ContentId, SimulatedContent>>,
    rejected: RwLock<HashMap<ContentId, String>>,
    sessions: Mutex<Vec<Weak<SimulatedSession>>>,
    acquisitions: AtomicUsize,
    last_readahead: AtomicU64,
}

/// Deterministic swarm engine backed by registered content.
///
/// Unknown identifiers get a session whose metadata never arrives, mirroring
/// a link nobody seeds. Links that are not magnet links are rejected.
#[derive(Clone, Default)]
pub struct SimulatedSwarm {
    state: Arc<SwarmState>,
}

impl SimulatedSwarm {
    /// Creates an engine with no registered content.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces the content served for `id`.
    pub fn add_content(&self, id: ContentId, content: SimulatedContent) {
        self.state.contents.write().insert(id, content);
    }

    /// Makes every acquisition of `id` fail with `reason`.
    pub fn reject(&self, id: ContentId, reason: impl Into<String>) {
        self.state.rejected.write().insert(id, reason.into());
    }

    /// Builds an engine serving every sub-directory of `root` as content.
    ///
    /// Each directory name is taken as the content identifier and every file
    /// beneath it, sorted by relative path, becomes one swarm file.
    ///
    /// # Errors
    ///
    /// - `io::Error` - If the directory tree cannot be read
    pub fn from_directory(root: &Path) -> io::Result<Self> {
        let swarm = Self::new();

        let mut entries: Vec<_> = std::fs::read_dir(root)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            if !entry.file_type()?.is_dir() {
                debug!("Skipping non-directory seed entry {}", entry.path().display());
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let mut files = Vec::new();
            collect_files(&entry.path(), &entry.path(), &mut files)?;
            files.sort_by(|a, b| a.path.cmp(&b.path));

            let content = files
                .into_iter()
                .fold(SimulatedContent::new(name.clone()), SimulatedContent::with_file);
            info!(
                "Seeded content {} with {} files",
                name,
                content.files.len()
            );
            swarm.add_content(ContentId::new(name.to_lowercase()), content);
        }

        Ok(swarm)
    }

    /// Identifiers of all registered content, sorted.
    pub fn content_ids(&self) -> Vec<ContentId> {
        let mut ids: Vec<_> = self.state.contents.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of `acquire` calls served so far.
    pub fn acquisition_count(&self) -> usize {
        self.state.acquisitions.load(Ordering::Acquire)
    }

    /// Number of sessions handed out, still alive and not yet closed.
    pub fn open_session_count(&self) -> usize {
        self.state
            .sessions
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|session| !session.is_closed())
            .count()
    }

    /// Most recent read-ahead hint given to any reader.
    pub fn last_readahead(&self) -> u64 {
        self.state.last_readahead.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SwarmEngine for SimulatedSwarm {
    async fn acquire(
        &self,
        id: &ContentId,
        uri: &str,
    ) -> Result<Arc<dyn SwarmSession>, SwarmError> {
        self.state.acquisitions.fetch_add(1, Ordering::AcqRel);

        if let Some(reason) = self.state.rejected.read().get(id).cloned() {
            return Err(SwarmError::Rejected {
                id: id.clone(),
                reason,
            });
        }
        if !uri.starts_with("magnet:") {
            return Err(SwarmError::Rejected {
                id: id.clone(),
                reason: "unsupported link".to_string(),
            });
        }

        let content = self.state.contents.read().get(id).cloned();
        let content = content.unwrap_or_else(|| {
            SimulatedContent::new(id.as_str()).with_metadata(MetadataBehavior::Never)
        });

        let session = Arc::new(SimulatedSession::start(
            id.clone(),
            content,
            Arc::clone(&self.state),
        ));
        {
            let mut sessions = self.state.sessions.lock();
            sessions.retain(|tracked| tracked.upgrade().is_some_and(|s| !s.is_closed()));
            sessions.push(Arc::downgrade(&session));
        }
        debug!("Simulated session started for {}", id);

        Ok(session)
    }
}

/// Session handed out by [`SimulatedSwarm`].
pub struct SimulatedSession {
    id: ContentId,
    info: Arc<SessionInfo>,
    sources: Vec<FileSource>,
    ready: watch::Sender<bool>,
    closed: Arc<AtomicBool>,
    swarm: Arc<SwarmState>,
}

impl SimulatedSession {
    fn start(id: ContentId, content: SimulatedContent, swarm: Arc<SwarmState>) -> Self {
        let (ready, _) = watch::channel(content.behavior == MetadataBehavior::Immediate);

        if let MetadataBehavior::Delayed(delay) = content.behavior {
            let notify = ready.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                notify.send_replace(true);
            });
        }

        Self {
            id,
            info: Arc::new(content.info()),
            sources: content.files.into_iter().map(|file| file.source).collect(),
            ready,
            closed: Arc::new(AtomicBool::new(false)),
            swarm,
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl SwarmSession for SimulatedSession {
    fn id(&self) -> &ContentId {
        &self.id
    }

    async fn metadata_ready(&self) {
        let mut ready = self.ready.subscribe();
        let resolved = ready.wait_for(|ready| *ready).await.is_ok();
        if !resolved {
            std::future::pending::<()>().await;
        }
    }

    fn info(&self) -> Option<Arc<SessionInfo>> {
        if *self.ready.borrow() {
            Some(Arc::clone(&self.info))
        } else {
            None
        }
    }

    async fn open_reader(
        &self,
        file_index: usize,
        start: u64,
    ) -> Result<Box<dyn SwarmReader>, SwarmError> {
        if self.is_closed() {
            return Err(SwarmError::SessionClosed {
                id: self.id.clone(),
            });
        }
        if !*self.ready.borrow() {
            return Err(SwarmError::MetadataUnavailable {
                id: self.id.clone(),
            });
        }

        let source = self
            .sources
            .get(file_index)
            .ok_or_else(|| SwarmError::FileIndex {
                id: self.id.clone(),
                index: file_index,
            })?;

        let source = match source {
            FileSource::Memory(data) => {
                let position = usize::try_from(start).unwrap_or(usize::MAX).min(data.len());
                ReaderSource::Memory {
                    data: data.clone(),
                    position,
                }
            }
            FileSource::Disk(path) => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(SeekFrom::Start(start)).await?;
                ReaderSource::Disk(file)
            }
        };

        Ok(Box::new(SimulatedReader {
            source,
            closed: Arc::clone(&self.closed),
            swarm: Arc::clone(&self.swarm),
        }))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Simulated session closed for {}", self.id);
        }
    }
}

enum ReaderSource {
    Memory { data: Bytes, position: usize },
    Disk(tokio::fs::File),
}

/// Reader over one simulated file; fails once its session is closed.
pub struct SimulatedReader {
    source: ReaderSource,
    closed: Arc<AtomicBool>,
    swarm: Arc<SwarmState>,
}

impl SwarmReader for SimulatedReader {
    fn set_readahead(&mut self, bytes: u64) {
        self.swarm.last_readahead.store(bytes, Ordering::Release);
    }
}

impl AsyncRead for SimulatedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.closed.load(Ordering::Acquire) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "swarm session closed",
            )));
        }

        match &mut this.source {
            ReaderSource::Memory { data, position } => {
                let remaining = &data[*position..];
                let count = remaining.len().min(buf.remaining());
                buf.put_slice(&remaining[..count]);
                *position += count;
                Poll::Ready(Ok(()))
            }
            ReaderSource::Disk(file) => Pin::new(file).poll_read(cx, buf),
        }
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<SimulatedFile>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            let relative = path
                .strip_prefix(root)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
                .components()
                .map(|component| component.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let length = entry.metadata()?.len();
            out.push(SimulatedFile::on_disk(relative, path, length));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    use super::*;

    fn magnet(id: &str) -> String {
        format!("magnet:?xt=urn:btih:{id}")
    }

    #[tokio::test]
    async fn test_immediate_metadata_and_reads() {
        let swarm = SimulatedSwarm::new();
        let id = ContentId::new("aa");
        swarm.add_content(
            id.clone(),
            SimulatedContent::new("Demo")
                .with_file(SimulatedFile::in_memory("a.txt", &b"hello world"[..]))
                .with_file(SimulatedFile::in_memory("b.txt", &b"xyz"[..])),
        );

        let session = swarm.acquire(&id, &magnet("aa")).await.unwrap();
        session.metadata_ready().await;
        let info = session.info().unwrap();
        assert_eq!(info.name, "Demo");
        assert_eq!(info.total_length, 14);
        assert_eq!(info.find_file("b.txt").map(|(i, _)| i), Some(1));

        let mut reader = session.open_reader(0, 6).await.unwrap();
        let mut out = String::new();
        reader.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "world");
    }

    #[tokio::test]
    async fn test_rejection_and_non_magnet_links() {
        let swarm = SimulatedSwarm::new();
        swarm.reject(ContentId::new("bad"), "blocked");

        let err = swarm
            .acquire(&ContentId::new("bad"), &magnet("bad"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SwarmError::Rejected { ref reason, .. } if reason == "blocked"));

        let err = swarm
            .acquire(&ContentId::new("x"), "https://example.com/file")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SwarmError::Rejected { .. }));
        assert_eq!(swarm.acquisition_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_content_never_resolves() {
        let swarm = SimulatedSwarm::new();
        let session = swarm
            .acquire(&ContentId::new("nobody"), &magnet("nobody"))
            .await
            .unwrap();

        let waited =
            tokio::time::timeout(Duration::from_millis(20), session.metadata_ready()).await;
        assert!(waited.is_err());
        assert!(session.info().is_none());
        assert!(matches!(
            session.open_reader(0, 0).await.err().unwrap(),
            SwarmError::MetadataUnavailable { .. }
        ));
    }

    #[tokio::test]
    async fn test_delayed_metadata() {
        let swarm = SimulatedSwarm::new();
        let id = ContentId::new("slow");
        swarm.add_content(
            id.clone(),
            SimulatedContent::new("Slow")
                .with_metadata(MetadataBehavior::Delayed(Duration::from_millis(10))),
        );

        let session = swarm.acquire(&id, &magnet("slow")).await.unwrap();
        assert!(session.info().is_none());
        tokio::time::timeout(Duration::from_secs(2), session.metadata_ready())
            .await
            .unwrap();
        assert!(session.info().is_some());
    }

    #[tokio::test]
    async fn test_reader_fails_after_close() {
        let swarm = SimulatedSwarm::new();
        let id = ContentId::new("cc");
        swarm.add_content(
            id.clone(),
            SimulatedContent::new("C").with_file(SimulatedFile::in_memory("f", vec![1u8; 64])),
        );

        let session = swarm.acquire(&id, &magnet("cc")).await.unwrap();
        let mut reader = session.open_reader(0, 0).await.unwrap();
        assert_eq!(swarm.open_session_count(), 1);

        session.close();
        let mut buf = [0u8; 8];
        let err = reader.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(swarm.open_session_count(), 0);
        assert!(matches!(
            session.open_reader(0, 0).await.err().unwrap(),
            SwarmError::SessionClosed { .. }
        ));
    }

    #[tokio::test]
    async fn test_finished_sessions_are_released() {
        let swarm = SimulatedSwarm::new();
        let id = ContentId::new("dd");
        swarm.add_content(id.clone(), SimulatedContent::new("D"));

        let closed = swarm.acquire(&id, &magnet("dd")).await.unwrap();
        closed.close();
        let dropped = swarm.acquire(&id, &magnet("dd")).await.unwrap();
        drop(dropped);
        let open = swarm.acquire(&id, &magnet("dd")).await.unwrap();

        assert_eq!(swarm.state.sessions.lock().len(), 1);
        assert_eq!(swarm.open_session_count(), 1);

        drop(closed);
        drop(open);
        assert_eq!(swarm.open_session_count(), 0);
        assert_eq!(Arc::strong_count(&swarm.state), 1);
    }

    #[tokio::test]
    async fn test_from_directory_seeds_content() {
        let dir = TempDir::new().unwrap();
        let content_dir = dir.path().join("ABC123");
        std::fs::create_dir_all(content_dir.join("extras")).unwrap();
        std::fs::write(content_dir.join("movie.mp4"), vec![7u8; 100]).unwrap();
        std::fs::write(content_dir.join("extras").join("subs.srt"), b"1\n").unwrap();
        std::fs::write(dir.path().join("stray.txt"), b"ignored").unwrap();

        let swarm = SimulatedSwarm::from_directory(dir.path()).unwrap();
        let id = ContentId::new("abc123");
        assert_eq!(swarm.content_ids(), [id.clone()]);
        let session = swarm.acquire(&id, &magnet("abc123")).await.unwrap();
        let info = session.info().unwrap();

        let paths: Vec<_> = info.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["extras/subs.srt", "movie.mp4"]);
        assert_eq!(info.total_length, 102);

        let mut reader = session.open_reader(1, 90).await.unwrap();
        reader.set_readahead(4096);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out.len(), 10);
        assert_eq!(swarm.last_readahead(), 4096);
    }
}

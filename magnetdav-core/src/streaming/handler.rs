//! Serves byte ranges of files from live swarm sessions.
//!
//! Requests are resolved against the session registry, answered from the
//! conditional cache when the client already holds the span, and otherwise
//! streamed from a swarm reader in fixed-size chunks.

use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, stream};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use super::StreamingError;
use super::cache::{CacheHeaders, CachePolicy, if_none_match};
use super::range::{ByteRangeRequest, ResolvedRange, normalize};
use crate::config::StreamingConfig;
use crate::content::{ContentId, ContentRecord, FileEntry};
use crate::media::{media_type_for, served_content_type};
use crate::session::LifecycleManager;
use crate::swarm::{SwarmReader, SwarmSession};

/// A file read request after HTTP decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    pub content_id: ContentId,
    /// Percent-decoded path relative to the content root.
    pub path: String,
    pub range: Option<ByteRangeRequest>,
    pub if_none_match: Option<String>,
    /// True for `HEAD`: headers are produced but no reader is opened.
    pub head_only: bool,
}

/// File located inside a live session.
pub struct ResolvedFile {
    pub session: Arc<dyn SwarmSession>,
    pub file_index: usize,
    pub path: String,
    pub length: u64,
}

/// Catalog view of one content record for directory listings.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryListing {
    pub record: ContentRecord,
    pub entries: Vec<ListingEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListingEntry {
    pub file: FileEntry,
    /// Files can only be opened once the record is ready.
    pub accessible: bool,
}

/// Range-aware file server over the lifecycle manager's sessions.
pub struct StreamingHandler {
    manager: LifecycleManager,
    cache: CachePolicy,
    readahead: u64,
    chunk_size: usize,
}

impl StreamingHandler {
    pub fn new(manager: LifecycleManager, config: &StreamingConfig) -> Self {
        Self {
            manager,
            cache: CachePolicy::from_config(config),
            readahead: config.readahead_bytes,
            chunk_size: config.chunk_size.max(1),
        }
    }

    /// Finds `path` among the files of the live session for `id`.
    ///
    /// # Errors
    ///
    /// - `StreamingError::NotFound` - If no session is registered for `id`
    /// - `StreamingError::NotReady` - If the session has no metadata yet
    /// - `StreamingError::FileNotFound` - If the session has no such file
    pub fn resolve(&self, id: &ContentId, path: &str) -> Result<ResolvedFile, StreamingError> {
        let path = path.trim_start_matches('/');
        let session = self
            .manager
            .lookup(id)
            .ok_or_else(|| StreamingError::NotFound { id: id.clone() })?;
        let info = session
            .info()
            .ok_or_else(|| StreamingError::NotReady { id: id.clone() })?;
        let (file_index, file) =
            info.find_file(path)
                .ok_or_else(|| StreamingError::FileNotFound {
                    id: id.clone(),
                    path: path.to_string(),
                })?;

        Ok(ResolvedFile {
            file_index,
            path: file.path.clone(),
            length: file.length,
            session,
        })
    }

    /// Answers a file request with a full, partial or not-modified response.
    ///
    /// # Errors
    ///
    /// - `StreamingError::NotFound` / `NotReady` / `FileNotFound` - See [`Self::resolve`]
    /// - `StreamingError::RangeNotSatisfiable` - If the range starts past the end
    /// - `StreamingError::Swarm` - If the reader cannot be opened
    pub async fn serve(&self, request: StreamRequest) -> Result<Response, StreamingError> {
        let file = self.resolve(&request.content_id, &request.path)?;
        let range = normalize(request.range, file.length).map_err(|e| {
            StreamingError::RangeNotSatisfiable {
                start: e.start,
                total: e.total,
            }
        })?;
        // Counted before the validator check, so a 304 is still an access
        self.manager.record_access(&request.content_id);

        let media_type = media_type_for(&file.path);
        let cache = self.cache.headers(&file.path, &media_type, &range, Utc::now());

        let cached = request
            .if_none_match
            .as_deref()
            .is_some_and(|header| if_none_match(header, &cache.etag));
        if cached {
            debug!("Not modified: {}/{}", request.content_id, file.path);
            return Ok(not_modified(&cache));
        }

        let body = if request.head_only || range.is_empty() {
            Body::empty()
        } else {
            let mut reader = file.session.open_reader(file.file_index, range.start).await?;
            reader.set_readahead(self.readahead);
            Body::from_stream(body_stream(
                reader,
                range.len(),
                self.chunk_size,
                format!("{}/{}", request.content_id, file.path),
            ))
        };

        Ok(file_response(&range, &media_type, &cache, body))
    }

    /// Lists the catalogued files of a record.
    ///
    /// # Errors
    ///
    /// - `StreamingError::NotFound` - If no record exists for `id`
    /// - `StreamingError::Catalog` - If the catalog cannot be read
    pub async fn directory_listing(
        &self,
        id: &ContentId,
    ) -> Result<DirectoryListing, StreamingError> {
        let catalog = self.manager.catalog();
        let record = catalog
            .get_record(id)
            .await?
            .ok_or_else(|| StreamingError::NotFound { id: id.clone() })?;
        let accessible = record.is_ready();
        let entries = catalog
            .files_for(id)
            .await?
            .into_iter()
            .map(|file| ListingEntry { file, accessible })
            .collect();

        Ok(DirectoryListing { record, entries })
    }
}

fn file_response(
    range: &ResolvedRange,
    media_type: &str,
    cache: &CacheHeaders,
    body: Body,
) -> Response {
    let mut response = Response::builder()
        .header(header::CONTENT_TYPE, served_content_type(media_type))
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, range.len().to_string())
        .header(header::ETAG, &cache.etag)
        .header(header::CACHE_CONTROL, &cache.cache_control)
        .header(header::EXPIRES, &cache.expires);

    if range.partial {
        response = response
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_RANGE, range.content_range());
    } else {
        response = response.status(StatusCode::OK);
    }

    response
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn not_modified(cache: &CacheHeaders) -> Response {
    Response::builder()
        .status(StatusCode::NOT_MODIFIED)
        .header(header::ETAG, &cache.etag)
        .header(header::CACHE_CONTROL, &cache.cache_control)
        .header(header::EXPIRES, &cache.expires)
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

struct CopyState {
    reader: Box<dyn SwarmReader>,
    remaining: u64,
    chunk_size: usize,
    label: String,
}

/// Streams exactly `length` bytes from `reader`.
///
/// A clean end of file before `length` ends the body early. Any other read
/// error is logged and ends the body with that error.
fn body_stream(
    reader: Box<dyn SwarmReader>,
    length: u64,
    chunk_size: usize,
    label: String,
) -> impl Stream<Item = Result<Bytes, io::Error>> + Send + 'static {
    let state = CopyState {
        reader,
        remaining: length,
        chunk_size,
        label,
    };

    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        if state.remaining == 0 {
            return None;
        }

        let want = state.remaining.min(state.chunk_size as u64) as usize;
        let mut buffer = vec![0u8; want];
        match state.reader.read(&mut buffer).await {
            Ok(0) => {
                debug!(
                    "Reader for {} ended {} bytes early",
                    state.label, state.remaining
                );
                None
            }
            Ok(n) => {
                buffer.truncate(n);
                state.remaining -= n as u64;
                Some((Ok(Bytes::from(buffer)), Some(state)))
            }
            Err(e) => {
                warn!("Copy from {} failed: {}", state.label, e);
                Some((Err(e), None))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::to_bytes;

    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::swarm::{SimulatedContent, SimulatedFile, SimulatedSwarm};

    async fn ready_handler() -> (StreamingHandler, SimulatedSwarm, ContentId) {
        let swarm = SimulatedSwarm::new();
        let id = ContentId::new("aa");
        let data: Vec<u8> = (0..100u8).collect();
        swarm.add_content(
            id.clone(),
            SimulatedContent::new("Movie")
                .with_file(SimulatedFile::in_memory("movie.mp4", data))
                .with_file(SimulatedFile::in_memory("subs/en.srt", &b"1\nhi\n"[..])),
        );

        let catalog = Arc::new(SqliteCatalog::open_in_memory().unwrap());
        let manager = LifecycleManager::new(catalog, Arc::new(swarm.clone()), Duration::from_secs(5));
        manager.submit("magnet:?xt=urn:btih:aa").await.unwrap();
        manager.settled().await;

        let handler = StreamingHandler::new(manager, &StreamingConfig::default());
        (handler, swarm, id)
    }

    fn request(id: &ContentId, path: &str, range: Option<&str>) -> StreamRequest {
        StreamRequest {
            content_id: id.clone(),
            path: path.to_string(),
            range: range.and_then(ByteRangeRequest::parse),
            if_none_match: None,
            head_only: false,
        }
    }

    #[tokio::test]
    async fn test_full_file_response() {
        let (handler, swarm, id) = ready_handler().await;

        let response = handler.serve(request(&id, "movie.mp4", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=86400");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(body.len(), 100);
        assert_eq!(body[99], 99);
        assert_eq!(swarm.last_readahead(), 2 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_single_byte_range() {
        let (handler, _swarm, id) = ready_handler().await;

        let response = handler
            .serve(request(&id, "movie.mp4", Some("bytes=0-0")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 0-0/100");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "1");

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], &[0u8]);
    }

    #[tokio::test]
    async fn test_text_files_carry_charset() {
        let (handler, _swarm, id) = ready_handler().await;

        let response = handler
            .serve(request(&id, "/subs/en.srt", None))
            .await
            .unwrap();
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=3600");
    }

    #[tokio::test]
    async fn test_if_none_match_short_circuits() {
        let (handler, _swarm, id) = ready_handler().await;

        let first = handler
            .serve(request(&id, "movie.mp4", Some("bytes=10-19")))
            .await
            .unwrap();
        let etag = first.headers()[header::ETAG].to_str().unwrap().to_string();

        let mut repeat = request(&id, "movie.mp4", Some("bytes=10-19"));
        repeat.if_none_match = Some(etag.clone());
        let response = handler.serve(repeat).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers()[header::ETAG], etag.as_str());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_head_sends_headers_only() {
        let (handler, _swarm, id) = ready_handler().await;

        let mut head = request(&id, "movie.mp4", Some("bytes=50-"));
        head.head_only = true;
        let response = handler.serve(head).await.unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "50");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_resolution_errors() {
        let (handler, _swarm, id) = ready_handler().await;

        let missing = handler
            .serve(request(&ContentId::new("zz"), "movie.mp4", None))
            .await;
        assert!(matches!(missing, Err(StreamingError::NotFound { .. })));

        let no_file = handler.serve(request(&id, "nope.mkv", None)).await;
        assert!(matches!(no_file, Err(StreamingError::FileNotFound { .. })));

        let beyond = handler
            .serve(request(&id, "movie.mp4", Some("bytes=100-")))
            .await;
        assert!(matches!(
            beyond,
            Err(StreamingError::RangeNotSatisfiable { start: 100, total: 100 })
        ));
    }

    #[tokio::test]
    async fn test_directory_listing_flags_accessibility() {
        let (handler, _swarm, id) = ready_handler().await;

        let listing = handler.directory_listing(&id).await.unwrap();
        assert!(listing.record.is_ready());
        let paths: Vec<_> = listing.entries.iter().map(|e| e.file.path.as_str()).collect();
        assert_eq!(paths, ["movie.mp4", "subs/en.srt"]);
        assert!(listing.entries.iter().all(|e| e.accessible));

        let missing = handler.directory_listing(&ContentId::new("zz")).await;
        assert!(matches!(missing, Err(StreamingError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_closed_session_terminates_body() {
        let (handler, _swarm, id) = ready_handler().await;

        let response = handler.serve(request(&id, "movie.mp4", None)).await.unwrap();
        handler.manager.lookup(&id).unwrap().close();

        let result = to_bytes(response.into_body(), usize::MAX).await;
        assert!(result.is_err());
    }
}

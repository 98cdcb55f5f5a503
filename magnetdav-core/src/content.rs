//! Content records, file entries and identifier derivation.
//!
//! A content record is created once per content identifier and tracks the
//! lifecycle of the swarm session behind it. File entries mirror the file list
//! the swarm reports for that content.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Marker preceding the content hash inside a magnet `xt` parameter.
const BTIH_MARKER: &str = "btih:";

/// Hex characters kept from the SHA-1 of a link without a content hash.
const FALLBACK_ID_LEN: usize = 20;

/// Stable identifier of a piece of remote content.
///
/// Derived from the content-hash field of a magnet link, or from a hash of the
/// raw link text when no such field is present.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Wraps an already-derived identifier, e.g. one taken from a request path.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives the identifier for a submitted link.
    ///
    /// The `btih:` token is taken up to the next `&` and lower-cased. Links
    /// without one hash to the first 20 hex characters of their SHA-1.
    ///
    /// # Examples
    /// ```
    /// use magnetdav_core::ContentId;
    ///
    /// let id = ContentId::from_uri("magnet:?xt=urn:btih:ABCDEF&dn=movie");
    /// assert_eq!(id.as_str(), "abcdef");
    /// ```
    pub fn from_uri(uri: &str) -> Self {
        if let Some(position) = uri.find(BTIH_MARKER) {
            let token = &uri[position + BTIH_MARKER.len()..];
            let token = token.split('&').next().unwrap_or_default();
            if !token.is_empty() {
                return Self(token.to_lowercase());
            }
        }

        let digest = Sha1::digest(uri.as_bytes());
        let mut encoded = hex::encode(digest);
        encoded.truncate(FALLBACK_ID_LEN);
        Self(encoded)
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a content record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentStatus {
    /// Submitted, waiting for the swarm to deliver metadata.
    Pending,
    /// Metadata received and the file catalog reconciled.
    Ready,
    /// Acquisition failed; see the record's error message.
    Error,
}

impl ContentStatus {
    /// Returns the persisted representation.
    pub fn as_str(self) -> &'static str {
        match self {
            ContentStatus::Pending => "pending",
            ContentStatus::Ready => "ready",
            ContentStatus::Error => "error",
        }
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a persisted status string is not recognised.
#[derive(Debug, thiserror::Error)]
#[error("Unknown content status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for ContentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ContentStatus::Pending),
            "ready" => Ok(ContentStatus::Ready),
            "error" => Ok(ContentStatus::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Persisted summary of one submitted content link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: ContentId,
    pub source_uri: String,
    pub name: String,
    pub total_size: u64,
    pub file_count: u32,
    pub status: ContentStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: u64,
}

impl ContentRecord {
    /// Creates the record stored on first submission of a link.
    ///
    /// The name starts as the magnet's display name (`dn`) when present and is
    /// replaced by the swarm-reported name once metadata arrives.
    pub fn pending(id: ContentId, source_uri: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            source_uri: source_uri.to_string(),
            name: display_name(source_uri).unwrap_or_default(),
            total_size: 0,
            file_count: 0,
            status: ContentStatus::Pending,
            error_message: None,
            created_at: now,
            updated_at: now,
            last_accessed: now,
            access_count: 0,
        }
    }

    /// Returns true once files of this record may be streamed.
    pub fn is_ready(&self) -> bool {
        self.status == ContentStatus::Ready
    }
}

/// Summary fields written when metadata becomes available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentSummary {
    pub name: String,
    pub total_size: u64,
    pub file_count: u32,
}

/// Catalog row for one file inside a content record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub id: i64,
    pub content_id: ContentId,
    pub path: String,
    pub name: String,
    pub size: u64,
    pub file_index: u32,
    pub media_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// File entry staged for insertion; the catalog assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFileEntry {
    pub content_id: ContentId,
    pub path: String,
    pub name: String,
    pub size: u64,
    pub file_index: u32,
    pub media_type: String,
}

impl NewFileEntry {
    /// Builds an entry for a swarm-reported path, deriving name and media type.
    pub fn new(content_id: ContentId, path: &str, size: u64, file_index: u32) -> Self {
        Self {
            content_id,
            path: path.to_string(),
            name: file_name(path).to_string(),
            size,
            file_index,
            media_type: crate::media::media_type_for(path),
        }
    }
}

/// Returns the last component of a relative path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Extracts the percent-decoded `dn` parameter of a magnet link.
fn display_name(uri: &str) -> Option<String> {
    let query = uri.split_once('?')?.1;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("dn="))
        .map(|raw| raw.replace('+', " "))
        .and_then(|raw| urlencoding::decode(&raw).ok().map(|name| name.into_owned()))
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_id_from_magnet_hash() {
        let id = ContentId::from_uri(
            "magnet:?xt=urn:btih:0123456789ABCDEF0123456789ABCDEF01234567&dn=Test&tr=udp://x",
        );
        assert_eq!(id.as_str(), "0123456789abcdef0123456789abcdef01234567");
    }

    #[test]
    fn test_content_id_hash_at_end_of_link() {
        let id = ContentId::from_uri("magnet:?dn=Test&xt=urn:btih:FFEE");
        assert_eq!(id.as_str(), "ffee");
    }

    #[test]
    fn test_content_id_fallback_is_deterministic() {
        let first = ContentId::from_uri("https://example.com/some.torrent");
        let second = ContentId::from_uri("https://example.com/some.torrent");
        let other = ContentId::from_uri("https://example.com/other.torrent");

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(first.as_str().len(), 20);
        assert!(first.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_empty_btih_token_falls_back_to_hash() {
        let id = ContentId::from_uri("magnet:?xt=urn:btih:&dn=x");
        assert_eq!(id.as_str().len(), 20);
    }

    #[test]
    fn test_status_round_trip_through_str() {
        for status in [
            ContentStatus::Pending,
            ContentStatus::Ready,
            ContentStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<ContentStatus>().unwrap(), status);
        }
        assert!("metadata".parse::<ContentStatus>().is_err());
    }

    #[test]
    fn test_pending_record_uses_display_name() {
        let record = ContentRecord::pending(
            ContentId::new("abc"),
            "magnet:?xt=urn:btih:abc&dn=Big%20Buck+Bunny",
        );
        assert_eq!(record.name, "Big Buck Bunny");
        assert_eq!(record.status, ContentStatus::Pending);
        assert_eq!(record.access_count, 0);
        assert!(!record.is_ready());
    }

    #[test]
    fn test_new_file_entry_derives_name_and_type() {
        let entry = NewFileEntry::new(ContentId::new("abc"), "Season 1/episode.mkv", 42, 3);
        assert_eq!(entry.name, "episode.mkv");
        assert_eq!(entry.media_type, "video/x-matroska");
        assert_eq!(entry.file_index, 3);
    }
}

//! Validators and freshness headers for streamed responses.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sha1::{Digest, Sha1};

use super::range::ResolvedRange;
use crate::config::StreamingConfig;
use crate::media::is_media;

/// Bytes of the SHA-1 digest kept in a validator.
const VALIDATOR_BYTES: usize = 16;

/// Computes the entity tag for a span of a file.
///
/// The tag depends only on the path and the normalized span, so repeated
/// requests for the same bytes revalidate against each other.
pub fn validator(path: &str, range: &ResolvedRange) -> String {
    let digest = Sha1::digest(format!("{}-{}-{}", path, range.start, range.last_byte()));
    format!("\"{}\"", hex::encode(&digest[..VALIDATOR_BYTES]))
}

/// Checks an `If-None-Match` header value against a validator.
///
/// Accepts `*`, a single tag or a comma-separated list; weak prefixes are
/// ignored for the comparison.
pub fn if_none_match(header: &str, validator: &str) -> bool {
    header.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate.strip_prefix("W/").unwrap_or(candidate) == validator
    })
}

/// Formats a timestamp as an HTTP date.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Header values a streamed response carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHeaders {
    pub etag: String,
    pub cache_control: String,
    pub expires: String,
}

/// Freshness windows per kind of response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub media_whole_file: Duration,
    pub media_range: Duration,
    pub other: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            media_whole_file: Duration::from_secs(86_400),
            media_range: Duration::from_secs(1_800),
            other: Duration::from_secs(3_600),
        }
    }
}

impl CachePolicy {
    pub fn from_config(config: &StreamingConfig) -> Self {
        Self {
            media_whole_file: config.media_whole_file_max_age,
            media_range: config.media_range_max_age,
            other: config.default_max_age,
        }
    }

    /// Freshness window for a response of `media_type` covering `range`.
    pub fn max_age(&self, media_type: &str, range: &ResolvedRange) -> Duration {
        if !is_media(media_type) {
            self.other
        } else if range.is_whole_file() {
            self.media_whole_file
        } else {
            self.media_range
        }
    }

    /// Builds validator and freshness headers as of `now`.
    pub fn headers(
        &self,
        path: &str,
        media_type: &str,
        range: &ResolvedRange,
        now: DateTime<Utc>,
    ) -> CacheHeaders {
        let max_age = self.max_age(media_type, range);
        let expires = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_add_signed(age))
            .unwrap_or(now);

        CacheHeaders {
            etag: validator(path, range),
            cache_control: format!("public, max-age={}", max_age.as_secs()),
            expires: http_date(expires),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::streaming::range::{ByteRangeRequest, normalize};

    fn range(header: Option<&str>, total: u64) -> ResolvedRange {
        normalize(header.and_then(ByteRangeRequest::parse), total).unwrap()
    }

    #[test]
    fn test_validator_is_stable_per_span() {
        let first = validator("movie.mp4", &range(Some("bytes=0-99"), 1000));
        let second = validator("movie.mp4", &range(Some("bytes=0-99"), 1000));
        let other_span = validator("movie.mp4", &range(Some("bytes=0-100"), 1000));
        let other_path = validator("other.mp4", &range(Some("bytes=0-99"), 1000));

        assert_eq!(first, second);
        assert_ne!(first, other_span);
        assert_ne!(first, other_path);
        assert_eq!(first.len(), 2 + VALIDATOR_BYTES * 2);
        assert!(first.starts_with('"') && first.ends_with('"'));
    }

    #[test]
    fn test_validator_uses_normalized_end() {
        let clamped = validator("a", &range(Some("bytes=10-999999"), 100));
        let explicit = validator("a", &range(Some("bytes=10-99"), 100));
        assert_eq!(clamped, explicit);
    }

    #[test]
    fn test_if_none_match_forms() {
        let tag = "\"abc\"";
        assert!(if_none_match("\"abc\"", tag));
        assert!(if_none_match("\"x\", \"abc\"", tag));
        assert!(if_none_match("W/\"abc\"", tag));
        assert!(if_none_match("*", tag));
        assert!(!if_none_match("\"abd\"", tag));
        assert!(!if_none_match("", tag));
    }

    #[test]
    fn test_freshness_windows() {
        let policy = CachePolicy::default();
        let whole = range(None, 100);
        let partial = range(Some("bytes=10-20"), 100);

        assert_eq!(policy.max_age("video/mp4", &whole).as_secs(), 86_400);
        assert_eq!(policy.max_age("video/mp4", &partial).as_secs(), 1_800);
        assert_eq!(policy.max_age("text/plain", &whole).as_secs(), 3_600);
        assert_eq!(policy.max_age("audio/mpeg", &partial).as_secs(), 1_800);
    }

    #[test]
    fn test_headers_expire_after_max_age() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let headers = CachePolicy::default().headers("a.srt", "text/plain", &range(None, 10), now);

        assert_eq!(headers.cache_control, "public, max-age=3600");
        assert_eq!(headers.expires, "Mon, 01 Jan 2024 01:00:00 GMT");
    }
}

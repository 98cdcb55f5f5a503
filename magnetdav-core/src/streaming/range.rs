//! HTTP byte-range parsing and normalization.
//!
//! Only single `bytes=start-end` ranges are understood. Anything else is
//! treated as if no range had been requested.

/// Range as requested by the client, before the file length is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRangeRequest {
    pub start: u64,
    /// Inclusive end; `None` means "to the end of the file".
    pub end: Option<u64>,
}

impl ByteRangeRequest {
    /// Parses a `Range` header value.
    ///
    /// Returns `None` for missing units, suffix ranges, multiple ranges and
    /// non-numeric bounds.
    ///
    /// # Examples
    /// ```
    /// use magnetdav_core::streaming::ByteRangeRequest;
    ///
    /// let range = ByteRangeRequest::parse("bytes=100-199").unwrap();
    /// assert_eq!((range.start, range.end), (100, Some(199)));
    /// assert!(ByteRangeRequest::parse("items=0-1").is_none());
    /// ```
    pub fn parse(header: &str) -> Option<Self> {
        let spec = header.trim().strip_prefix("bytes=")?;
        if spec.contains(',') {
            return None;
        }

        let (start, end) = spec.split_once('-')?;
        let start = start.trim().parse::<u64>().ok()?;
        let end = match end.trim() {
            "" => None,
            end => Some(end.parse::<u64>().ok()?),
        };
        Some(Self { start, end })
    }
}

/// Byte span of a file that will actually be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRange {
    pub start: u64,
    /// Exclusive end offset.
    pub end: u64,
    /// Length of the whole file.
    pub total: u64,
    /// True when answering a range request with `206 Partial Content`.
    pub partial: bool,
}

impl ResolvedRange {
    /// Number of bytes in the span.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Inclusive last byte, as used in `Content-Range`.
    pub fn last_byte(&self) -> u64 {
        self.end.saturating_sub(1)
    }

    /// True when the span covers the entire file.
    pub fn is_whole_file(&self) -> bool {
        self.start == 0 && self.end == self.total
    }

    /// `Content-Range` header value for partial responses.
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.last_byte(), self.total)
    }
}

/// Raised when the requested start lies beyond the end of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Range starting at {start} is not satisfiable for length {total}")]
pub struct UnsatisfiableRange {
    pub start: u64,
    pub total: u64,
}

/// Clamps a requested range to a file of `total` bytes.
///
/// A missing end, or an end at or beyond the file length, becomes the last
/// byte of the file.
///
/// # Errors
///
/// - `UnsatisfiableRange` - If `start >= total` or `end < start`
pub fn normalize(
    request: Option<ByteRangeRequest>,
    total: u64,
) -> Result<ResolvedRange, UnsatisfiableRange> {
    let Some(request) = request else {
        return Ok(ResolvedRange {
            start: 0,
            end: total,
            total,
            partial: false,
        });
    };

    let unsatisfiable = UnsatisfiableRange {
        start: request.start,
        total,
    };
    if request.start >= total {
        return Err(unsatisfiable);
    }

    let last = match request.end {
        Some(end) if end < total => end,
        _ => total - 1,
    };
    if last < request.start {
        return Err(unsatisfiable);
    }

    Ok(ResolvedRange {
        start: request.start,
        end: last + 1,
        total,
        partial: true,
    })
}

//! Byte-range requests.
//!
//! Only the `bytes=<start>-<end>` form is understood, and only the first
//! range of a list. Parsing is permissive: an absent or unparsable `start`
//! reads as `0`, an absent or unparsable `end` as the last byte, and an
//! `end` past the file is clamped. A `start` at or past the end of the file
//! is the one hard failure.

use hyper::header::{HeaderMap, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE};
use hyper::StatusCode;

use crate::headers::insert_display;

/// An inclusive byte window within a file of `size` bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RangeWindow {
    pub start: u64,
    pub end: u64,
    pub size: u64,
}

impl RangeWindow {
    /// Number of bytes in the window; never zero.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Sets `Content-Range`, `Content-Length` and `Accept-Ranges`.
    pub fn apply(&self, headers: &mut HeaderMap) {
        insert_display(
            headers,
            CONTENT_RANGE,
            format_args!("bytes {}-{}/{}", self.start, self.end, self.size),
        );
        insert_display(headers, CONTENT_LENGTH, self.len());
        insert_display(headers, ACCEPT_RANGES, "bytes");
    }
}

/// Result of evaluating a `Range` header against a file size.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RangeOutcome {
    /// Serve this window with `206 Partial Content`.
    Partial(RangeWindow),
    /// Nothing servable: `416` with `Content-Range: bytes */<size>`.
    Unsatisfiable { size: u64 },
}

impl RangeOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Partial(_) => StatusCode::PARTIAL_CONTENT,
            Self::Unsatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
        }
    }

    /// Writes the headers this outcome requires.
    pub fn apply(&self, headers: &mut HeaderMap) {
        match self {
            Self::Partial(window) => window.apply(headers),
            Self::Unsatisfiable { size } => {
                insert_display(headers, CONTENT_RANGE, format_args!("bytes */{size}"));
            }
        }
    }
}

/// Evaluates `header` (the raw `Range` value) for a file of `size` bytes.
///
/// # Example
///
/// ```
/// use quay::{compute_range, RangeOutcome};
///
/// match compute_range("bytes=0-0", 10) {
///     RangeOutcome::Partial(w) => assert_eq!((w.start, w.end, w.len()), (0, 0, 1)),
///     RangeOutcome::Unsatisfiable { .. } => unreachable!(),
/// }
/// ```
pub fn compute_range(header: &str, size: u64) -> RangeOutcome {
    let spec = header.trim();
    let spec = spec.strip_prefix("bytes=").unwrap_or(spec);
    let spec = spec.split(',').next().unwrap_or_default();
    let (first, last) = spec.split_once('-').unwrap_or((spec, ""));

    let last_byte = size.saturating_sub(1);
    let start = first.trim().parse::<u64>().unwrap_or(0);
    let end = last
        .trim()
        .parse::<u64>()
        .map_or(last_byte, |end| end.min(last_byte));

    if start >= size || start > end {
        return RangeOutcome::Unsatisfiable { size };
    }
    RangeOutcome::Partial(RangeWindow { start, end, size })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(header: &str, size: u64) -> RangeWindow {
        match compute_range(header, size) {
            RangeOutcome::Partial(window) => window,
            other => panic!("expected a partial window, got {other:?}"),
        }
    }

    #[test]
    fn test_first_byte() {
        let w = window("bytes=0-0", 42);
        assert_eq!((w.start, w.end, w.len()), (0, 0, 1));
    }

    #[test]
    fn test_open_ended_range_runs_to_last_byte() {
        let w = window("bytes=10-", 100);
        assert_eq!((w.start, w.end), (10, 99));
    }

    #[test]
    fn test_end_is_clamped() {
        let w = window("bytes=90-5000", 100);
        assert_eq!((w.start, w.end, w.len()), (90, 99, 10));
    }

    #[test]
    fn test_missing_start_reads_as_zero() {
        let w = window("bytes=-20", 100);
        assert_eq!((w.start, w.end), (0, 20));
    }

    /// Garbage on either side falls back to the defaults instead of failing.
    #[test]
    fn test_unparsable_bounds_are_permissive() {
        assert_eq!(window("bytes=abc-xyz", 50), RangeWindow { start: 0, end: 49, size: 50 });
        assert_eq!(window("bytes=5-oops", 50).end, 49);
        assert_eq!(window("nonsense", 50).start, 0);
    }

    #[test]
    fn test_start_at_size_is_unsatisfiable() {
        assert_eq!(compute_range("bytes=100-", 100), RangeOutcome::Unsatisfiable { size: 100 });
        assert_eq!(compute_range("bytes=500-600", 100), RangeOutcome::Unsatisfiable { size: 100 });
    }

    #[test]
    fn test_empty_file_is_unsatisfiable() {
        assert_eq!(compute_range("bytes=0-", 0), RangeOutcome::Unsatisfiable { size: 0 });
    }

    #[test]
    fn test_inverted_range_is_unsatisfiable() {
        assert_eq!(compute_range("bytes=9-3", 100), RangeOutcome::Unsatisfiable { size: 100 });
    }

    #[test]
    fn test_only_first_range_of_a_list_counts() {
        let w = window("bytes=0-1, 5-6", 10);
        assert_eq!((w.start, w.end), (0, 1));
    }

    #[test]
    fn test_partial_headers() {
        let outcome = compute_range("bytes=2-5", 10);
        let mut headers = HeaderMap::new();
        outcome.apply(&mut headers);

        assert_eq!(outcome.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(headers[CONTENT_RANGE], "bytes 2-5/10");
        assert_eq!(headers[CONTENT_LENGTH], "4");
        assert_eq!(headers[ACCEPT_RANGES], "bytes");
    }

    #[test]
    fn test_unsatisfiable_headers() {
        let outcome = compute_range("bytes=10-", 10);
        let mut headers = HeaderMap::new();
        outcome.apply(&mut headers);

        assert_eq!(outcome.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(headers[CONTENT_RANGE], "bytes */10");
        assert!(headers.get(CONTENT_LENGTH).is_none());
    }
}

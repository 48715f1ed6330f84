//! HTTP Range request parsing module
//!
//! Reads a single `bytes=<start>-<end>` span out of a Range header. Malformed or
//! missing fields fall back to the whole file instead of failing the request.

/// Inclusive byte span requested by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte position
    pub start: u64,
    /// Last byte position (inclusive)
    pub end: u64,
    /// Total size of the underlying file
    pub total_length: u64,
}

impl ByteRange {
    /// Number of bytes covered by the span, zero when inverted
    #[inline]
    pub const fn len(&self) -> u64 {
        if self.end < self.start {
            0
        } else {
            self.end - self.start + 1
        }
    }

    /// True when the span lies inside the file and is not inverted
    #[inline]
    pub const fn is_satisfiable(&self) -> bool {
        self.start <= self.end && self.start < self.total_length
    }
}

/// Parse HTTP Range header (single range only, bytes unit)
///
/// Only the first `bytes=<start>-<end>` occurrence is read. Either number may be
/// absent:
/// - missing or non-numeric `end` means the last byte of the file
/// - missing or non-numeric `start` means byte 0
/// - when `start` has no digits at all, the `end` digits are ignored too
///
/// `bytes=-500` is therefore the whole file, not the last 500 bytes. Start/end are
/// not checked against each other or the file size here; the responder decides what
/// to do with a span that falls outside the file.
///
/// # Examples
/// ```
/// use mediashare::http::range::{parse_range_header, ByteRange};
///
/// let range = parse_range_header(Some("bytes=0-99"), 1000);
/// assert_eq!(range, Some(ByteRange { start: 0, end: 99, total_length: 1000 }));
///
/// assert_eq!(parse_range_header(None, 1000), None);
/// ```
pub fn parse_range_header(range_header: Option<&str>, total_length: u64) -> Option<ByteRange> {
    let header = range_header.filter(|h| !h.is_empty())?;

    let (start, end) = header
        .match_indices("bytes=")
        .find_map(|(idx, unit)| split_span(&header[idx + unit.len()..]))
        .unwrap_or(("", ""));

    let last = total_length.saturating_sub(1);
    let end = if start.is_empty() {
        last
    } else {
        end.parse().unwrap_or(last)
    };

    Some(ByteRange {
        start: start.parse().unwrap_or(0),
        end,
        total_length,
    })
}

/// Split `<digits>-<digits>` off the front of `text`, either side may be empty
fn split_span(text: &str) -> Option<(&str, &str)> {
    let start_len = leading_digits(text);
    let rest = text[start_len..].strip_prefix('-')?;
    let end_len = leading_digits(rest);
    Some((&text[..start_len], &rest[..end_len]))
}

fn leading_digits(s: &str) -> usize {
    s.bytes().take_while(u8::is_ascii_digit).count()
}

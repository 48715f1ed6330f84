//! Content type sniffing module
//!
//! Classifies media files from their leading bytes. Each signature is a short
//! literal pattern, optionally followed by bit-masked checks on the bytes after it
//! to tell apart formats that share the same start code.

use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

/// Upper bound on bytes read from the start of a file for classification
pub const SNIFF_LIMIT: u64 = 64 * 1024;

/// Content type used when no signature matches
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Bitwise operator applied to a value read after a pattern occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitOp {
    And,
    Or,
    Xor,
}

impl BitOp {
    const fn apply(self, value: u32, operand: u32) -> u32 {
        match self {
            Self::And => value & operand,
            Self::Or => value | operand,
            Self::Xor => value ^ operand,
        }
    }
}

/// Secondary check evaluated relative to a pattern occurrence
#[derive(Debug, Clone, Copy)]
pub struct Check {
    /// Offset from the start of the occurrence
    pub offset: usize,
    /// Big-endian integer width in bytes (1..=4)
    pub width: usize,
    pub op: BitOp,
    pub operand: u32,
    /// When set, the result must equal this value; otherwise any nonzero
    /// result matches the rule outright
    pub expect: Option<u32>,
}

/// What has to hold after the literal pattern for a signature to match
#[derive(Debug, Clone, Copy)]
pub enum Disambiguator {
    /// The pattern alone is enough
    Literal,
    /// Ordered secondary checks
    Checks(&'static [Check]),
}

/// Magic-byte signature
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub mime_type: &'static str,
    pub pattern: &'static [u8],
    pub disambiguator: Disambiguator,
}

const fn literal(mime_type: &'static str, pattern: &'static [u8]) -> Signature {
    Signature {
        mime_type,
        pattern,
        disambiguator: Disambiguator::Literal,
    }
}

const fn checked(
    mime_type: &'static str,
    pattern: &'static [u8],
    checks: &'static [Check],
) -> Signature {
    Signature {
        mime_type,
        pattern,
        disambiguator: Disambiguator::Checks(checks),
    }
}

/// Ordered signature table. Signatures sharing a pattern must stay ordered
/// most-specific first.
pub static SIGNATURES: &[Signature] = &[
    // MPEG-2 program stream: pack header marker bit set
    checked(
        "video/mp2p",
        &[0x00, 0x00, 0x01, 0xBA],
        &[Check {
            offset: 4,
            width: 1,
            op: BitOp::And,
            operand: 0x40,
            expect: None,
        }],
    ),
    // MPEG-1 system stream: marker bit clear
    checked(
        "video/mpeg",
        &[0x00, 0x00, 0x01, 0xBA],
        &[Check {
            offset: 4,
            width: 1,
            op: BitOp::Xor,
            operand: 0x40,
            expect: None,
        }],
    ),
    literal("video/ogg", &[0x4F, 0x67, 0x67, 0x53, 0x00]),
    literal("video/mpeg", &[0x00, 0x00, 0x01, 0xBB]),
    literal("video/mp4v-es", &[0x00, 0x00, 0x01, 0xB0]),
    literal("video/mp4v-es", &[0x00, 0x00, 0x01, 0xB5]),
    // "ftypmp4"
    literal("video/mp4", &[0x66, 0x74, 0x79, 0x70, 0x6D, 0x70, 0x34]),
    literal("video/mpv", &[0x00, 0x00, 0x01, 0xB3]),
    // TS sync byte, then TEI clear, PUSI set, PID 0, payload present
    checked(
        "video/mp2t",
        &[0x47],
        &[Check {
            offset: 1,
            width: 3,
            op: BitOp::And,
            operand: 0x5F_FF10,
            expect: Some(0x40_0010),
        }],
    ),
    // Annex-B start code followed by an SPS NAL unit
    checked(
        "video/h264",
        &[0x00, 0x00, 0x00, 0x01],
        &[Check {
            offset: 4,
            width: 1,
            op: BitOp::And,
            operand: 0x1F,
            expect: Some(0x07),
        }],
    ),
];

/// Classify a buffer against the built-in signature table
///
/// # Examples
/// ```
/// use mediashare::http::sniff::classify;
///
/// assert_eq!(classify(&[0x4F, 0x67, 0x67, 0x53, 0x00, 0x02]), Some("video/ogg"));
/// assert_eq!(classify(b"plain text"), None);
/// ```
pub fn classify(buffer: &[u8]) -> Option<&'static str> {
    classify_with(SIGNATURES, buffer)
}

/// Classify a buffer against an arbitrary ordered table
pub fn classify_with(table: &[Signature], buffer: &[u8]) -> Option<&'static str> {
    table
        .iter()
        .find(|sig| signature_matches(sig, buffer))
        .map(|sig| sig.mime_type)
}

/// Try every occurrence of the pattern until one satisfies the disambiguator
fn signature_matches(sig: &Signature, buffer: &[u8]) -> bool {
    let mut cursor = 0;
    while let Some(pos) = find(buffer, sig.pattern, cursor) {
        let matched = match sig.disambiguator {
            Disambiguator::Literal => true,
            Disambiguator::Checks(checks) => checks_match(checks, buffer, pos),
        };
        if matched {
            return true;
        }
        cursor = pos + 1;
    }
    false
}

/// Evaluate secondary checks at one occurrence.
///
/// Checks with an `expect` value must all hold; a check without one matches the
/// rule as soon as it yields a nonzero result.
fn checks_match(checks: &[Check], buffer: &[u8], pos: usize) -> bool {
    let mut matched = false;
    for check in checks {
        let value = read_be(buffer, pos + check.offset, check.width)
            .map(|v| check.op.apply(v, check.operand));

        if let Some(expect) = check.expect {
            if value == Some(expect) {
                matched = true;
                continue;
            }
            return false;
        }

        if value.is_some_and(|v| v != 0) {
            return true;
        }
        matched = false;
    }
    matched
}

/// Read a big-endian unsigned integer, `None` if it would run past the buffer
fn read_be(buffer: &[u8], offset: usize, width: usize) -> Option<u32> {
    if width == 0 || width > 4 {
        return None;
    }
    let bytes = buffer.get(offset..offset.checked_add(width)?)?;
    Some(bytes.iter().fold(0, |acc, &b| (acc << 8) | u32::from(b)))
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|i| i + from)
}

/// Read at most [`SNIFF_LIMIT`] bytes from the start of a file and classify them.
///
/// The file handle is dropped before this returns, on success or error.
pub async fn sniff_file(path: &Path) -> std::io::Result<Option<&'static str>> {
    let file = File::open(path).await?;
    let mut buffer = Vec::new();
    file.take(SNIFF_LIMIT).read_to_end(&mut buffer).await?;
    Ok(classify(&buffer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_stream_marker_set() {
        assert_eq!(
            classify(&[0x00, 0x00, 0x01, 0xBA, 0x44, 0x00, 0x04]),
            Some("video/mp2p")
        );
        assert_eq!(
            classify(&[0x00, 0x00, 0x01, 0xBA, 0x40, 0x00]),
            Some("video/mp2p")
        );
    }

    #[test]
    fn test_program_stream_marker_clear() {
        assert_eq!(
            classify(&[0x00, 0x00, 0x01, 0xBA, 0x00, 0x00]),
            Some("video/mpeg")
        );
    }

    #[test]
    fn test_ogg() {
        assert_eq!(
            classify(&[0x4F, 0x67, 0x67, 0x53, 0x00, 0x02, 0x00]),
            Some("video/ogg")
        );
    }

    #[test]
    fn test_mp4_ftyp_box() {
        let mut buf = vec![0x00, 0x00, 0x00, 0x18];
        buf.extend_from_slice(b"ftypmp42");
        buf.extend_from_slice(&[0x00; 16]);
        assert_eq!(classify(&buf), Some("video/mp4"));
    }

    #[test]
    fn test_elementary_streams() {
        assert_eq!(classify(&[0x00, 0x00, 0x01, 0xB3, 0x16]), Some("video/mpv"));
        assert_eq!(classify(&[0x00, 0x00, 0x01, 0xB0, 0x01]), Some("video/mp4v-es"));
        assert_eq!(classify(&[0x00, 0x00, 0x01, 0xBB, 0x00]), Some("video/mpeg"));
    }

    #[test]
    fn test_transport_stream() {
        // sync, PUSI + PID 0, payload only
        assert_eq!(classify(&[0x47, 0x40, 0x00, 0x10, 0x00]), Some("video/mp2t"));
        // PID 0x100 fails the mask
        assert_eq!(classify(&[0x47, 0x41, 0x00, 0x10, 0x00]), None);
    }

    #[test]
    fn test_later_occurrence_still_matches() {
        // first 0x47 is followed by junk, the second one is a real packet header
        let buf = [0x47, 0xFF, 0xFF, 0xFF, 0x47, 0x40, 0x00, 0x10];
        assert_eq!(classify(&buf), Some("video/mp2t"));
    }

    #[test]
    fn test_h264_sps() {
        assert_eq!(
            classify(&[0x00, 0x00, 0x00, 0x01, 0x67, 0x42]),
            Some("video/h264")
        );
        // slice NAL, not an SPS
        assert_eq!(classify(&[0x00, 0x00, 0x00, 0x01, 0x65, 0x88]), None);
    }

    #[test]
    fn test_unknown() {
        assert_eq!(classify(b"just some text"), None);
        assert_eq!(classify(&[]), None);
    }

    #[test]
    fn test_check_past_end_of_buffer() {
        // pattern at the very end, no byte to inspect
        assert_eq!(classify(&[0x00, 0x00, 0x01, 0xBA]), None);
    }

    #[test]
    fn test_mixed_checks_last_result_wins() {
        static TABLE: &[Signature] = &[checked(
            "test/mixed",
            &[0xAA],
            &[
                Check {
                    offset: 1,
                    width: 1,
                    op: BitOp::And,
                    operand: 0xFF,
                    expect: Some(0x01),
                },
                Check {
                    offset: 2,
                    width: 1,
                    op: BitOp::And,
                    operand: 0xFF,
                    expect: None,
                },
            ],
        )];
        assert_eq!(classify_with(TABLE, &[0xAA, 0x01, 0x02]), Some("test/mixed"));
        // equality passed but the trailing zero check resets the match
        assert_eq!(classify_with(TABLE, &[0xAA, 0x01, 0x00]), None);
        assert_eq!(classify_with(TABLE, &[0xAA, 0x02, 0x02]), None);
    }

    #[test]
    fn test_read_be_widths() {
        assert_eq!(read_be(&[0x12, 0x34, 0x56], 0, 3), Some(0x12_3456));
        assert_eq!(read_be(&[0x12, 0x34], 1, 1), Some(0x34));
        assert_eq!(read_be(&[0x12, 0x34], 1, 2), None);
    }

    #[tokio::test]
    async fn test_sniff_file_reads_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.ogv");
        let mut data = vec![0x4F, 0x67, 0x67, 0x53, 0x00];
        data.resize(200_000, 0xAB);
        tokio::fs::write(&path, &data).await.unwrap();

        assert_eq!(sniff_file(&path).await.unwrap(), Some("video/ogg"));
    }

    #[tokio::test]
    async fn test_sniff_file_ignores_bytes_past_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.bin");
        let mut data = vec![0x11; usize::try_from(SNIFF_LIMIT).unwrap()];
        data.extend_from_slice(&[0x4F, 0x67, 0x67, 0x53, 0x00]);
        tokio::fs::write(&path, &data).await.unwrap();

        assert_eq!(sniff_file(&path).await.unwrap(), None);
    }
}

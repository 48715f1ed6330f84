//! File streaming module
//!
//! Turns a resolved file, its sniffed content type and an optional byte range into
//! a complete response: headers are fixed up front, the body is a lazy stream of
//! chunks read from the file on demand.

use std::io::SeekFrom;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use hyper::header::{
    HeaderMap, HeaderValue, ACCEPT_RANGES, CACHE_CONTROL, CONTENT_DISPOSITION, CONTENT_LENGTH,
    CONTENT_RANGE, CONTENT_TYPE, LAST_MODIFIED,
};
use hyper::{Response, StatusCode};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use super::range::ByteRange;
use super::response::{self, ResponseBody};
use crate::sandbox::ResolvedEntry;

/// Default capacity of each body chunk
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Characters left as-is in an RFC 5987 `filename*` value
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

/// Everything needed to answer a request for one file
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    pub entry: ResolvedEntry,
    pub mime_type: &'static str,
    pub filename: String,
    pub range: Option<ByteRange>,
}

impl StreamDescriptor {
    pub fn new(entry: ResolvedEntry, mime_type: &'static str, range: Option<ByteRange>) -> Self {
        let filename = entry.file_name();
        Self {
            entry,
            mime_type,
            filename,
            range,
        }
    }
}

/// Status and headers decided before any body byte is read
#[derive(Debug)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// First byte to stream
    pub offset: u64,
    /// Number of bytes to stream
    pub length: u64,
}

/// What was actually served, for the access log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServedSpan {
    pub status: StatusCode,
    /// Inclusive byte span for partial responses
    pub range: Option<(u64, u64)>,
    pub bytes: u64,
}

/// Decide status and headers for a file response.
///
/// A range ending past the last byte is clamped to it. A range starting past the end
/// of the file, or ending before it starts, gets a 416.
pub fn plan(desc: &StreamDescriptor) -> ResponseHead {
    let size = desc.entry.size;
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(desc.mime_type));
    headers.insert(CONTENT_DISPOSITION, content_disposition(&desc.filename));
    if let Some(modified) = desc.entry.modified {
        if let Ok(value) = HeaderValue::from_str(&http_date(modified)) {
            headers.insert(LAST_MODIFIED, value);
        }
    }

    let Some(requested) = desc.range else {
        headers.insert(CONTENT_LENGTH, HeaderValue::from(size));
        return ResponseHead {
            status: StatusCode::OK,
            headers,
            offset: 0,
            length: size,
        };
    };

    let range = ByteRange {
        end: requested.end.min(size.saturating_sub(1)),
        total_length: size,
        ..requested
    };
    if !range.is_satisfiable() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(0u64));
        if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
            headers.insert(CONTENT_RANGE, value);
        }
        return ResponseHead {
            status: StatusCode::RANGE_NOT_SATISFIABLE,
            headers,
            offset: 0,
            length: 0,
        };
    }

    let length = range.len();
    headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
    if let Ok(value) = HeaderValue::from_str(&format!(
        "bytes {}-{}/{}",
        range.start, range.end, range.total_length
    )) {
        headers.insert(CONTENT_RANGE, value);
    }
    headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));

    ResponseHead {
        status: StatusCode::PARTIAL_CONTENT,
        headers,
        offset: range.start,
        length,
    }
}

/// Build the full response for a file.
///
/// The file is opened only when there is something to stream. The handle lives in
/// the body: it is closed when the last chunk has been read or when the body is
/// dropped because the client went away.
pub async fn respond(
    desc: &StreamDescriptor,
    is_head: bool,
    chunk_size: usize,
) -> std::io::Result<(Response<ResponseBody>, ServedSpan)> {
    let head = plan(desc);

    let body = if is_head || head.length == 0 {
        response::empty()
    } else {
        open_span(desc, head.offset, head.length, chunk_size).await?
    };

    let served = ServedSpan {
        status: head.status,
        range: (head.status == StatusCode::PARTIAL_CONTENT)
            .then(|| (head.offset, head.offset + head.length - 1)),
        bytes: if is_head { 0 } else { head.length },
    };

    let mut resp = Response::new(body);
    *resp.status_mut() = head.status;
    *resp.headers_mut() = head.headers;
    Ok((resp, served))
}

async fn open_span(
    desc: &StreamDescriptor,
    offset: u64,
    length: u64,
    chunk_size: usize,
) -> std::io::Result<ResponseBody> {
    let mut file = File::open(&desc.entry.absolute_path).await?;
    if offset > 0 {
        file.seek(SeekFrom::Start(offset)).await?;
    }
    let reader = file.take(length);
    let stream = ReaderStream::with_capacity(reader, chunk_size.max(1)).map_ok(Frame::data);
    Ok(StreamBody::new(stream).boxed_unsync())
}

/// `attachment; filename="..."`, adding `filename*` when the name is not plain ASCII
fn content_disposition(filename: &str) -> HeaderValue {
    let plain = filename
        .chars()
        .all(|c| c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\');

    let value = if plain {
        format!("attachment; filename=\"{filename}\"")
    } else {
        let fallback: String = filename
            .chars()
            .map(|c| {
                if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!(
            "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
            utf8_percent_encode(filename, FILENAME_ENCODE_SET)
        )
    };

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// IMF-fixdate as used by `Last-Modified`
fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::EntryKind;
    use std::path::PathBuf;
    use std::time::Duration;

    fn entry(path: PathBuf, size: u64) -> ResolvedEntry {
        ResolvedEntry {
            absolute_path: path,
            kind: EntryKind::File,
            size,
            modified: Some(SystemTime::UNIX_EPOCH + Duration::from_secs(784_111_777)),
        }
    }

    fn descriptor(size: u64, range: Option<ByteRange>) -> StreamDescriptor {
        StreamDescriptor::new(
            entry(PathBuf::from("/srv/media/clip.mp4"), size),
            "video/mp4",
            range,
        )
    }

    #[test]
    fn test_partial_head() {
        let head = plan(&descriptor(
            100,
            Some(ByteRange {
                start: 10,
                end: 19,
                total_length: 100,
            }),
        ));
        assert_eq!(head.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(head.headers[CONTENT_LENGTH], "10");
        assert_eq!(head.headers[CONTENT_RANGE], "bytes 10-19/100");
        assert_eq!(head.headers[ACCEPT_RANGES], "bytes");
        assert_eq!(head.headers[CACHE_CONTROL], "no-cache");
        assert_eq!(head.headers[CONTENT_TYPE], "video/mp4");
        assert_eq!((head.offset, head.length), (10, 10));
    }

    #[test]
    fn test_full_head() {
        let head = plan(&descriptor(100, None));
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(head.headers[CONTENT_LENGTH], "100");
        assert!(!head.headers.contains_key(CONTENT_RANGE));
        assert!(!head.headers.contains_key(ACCEPT_RANGES));
        assert_eq!(
            head.headers[CONTENT_DISPOSITION],
            "attachment; filename=\"clip.mp4\""
        );
        assert_eq!(
            head.headers[LAST_MODIFIED],
            "Sun, 06 Nov 1994 08:49:37 GMT"
        );
    }

    #[test]
    fn test_range_end_clamped_to_file() {
        let head = plan(&descriptor(
            100,
            Some(ByteRange {
                start: 90,
                end: 5000,
                total_length: 100,
            }),
        ));
        assert_eq!(head.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(head.headers[CONTENT_RANGE], "bytes 90-99/100");
        assert_eq!(head.headers[CONTENT_LENGTH], "10");
    }

    #[test]
    fn test_unsatisfiable_ranges() {
        for (start, end) in [(50, 10), (100, 150)] {
            let head = plan(&descriptor(
                100,
                Some(ByteRange {
                    start,
                    end,
                    total_length: 100,
                }),
            ));
            assert_eq!(head.status, StatusCode::RANGE_NOT_SATISFIABLE);
            assert_eq!(head.headers[CONTENT_RANGE], "bytes */100");
            assert_eq!(head.length, 0);
        }
    }

    #[test]
    fn test_non_ascii_disposition() {
        let value = content_disposition("película.mp4");
        assert_eq!(
            value,
            "attachment; filename=\"pel_cula.mp4\"; filename*=UTF-8''pel%C3%ADcula.mp4"
        );
    }

    async fn write_fixture(len: u8) -> (tempfile::TempDir, StreamDescriptor) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        let data: Vec<u8> = (0..len).collect();
        tokio::fs::write(&path, &data).await.unwrap();
        let desc = StreamDescriptor::new(
            entry(path, u64::from(len)),
            "application/octet-stream",
            None,
        );
        (dir, desc)
    }

    #[tokio::test]
    async fn test_respond_partial_streams_span() {
        let (_dir, mut desc) = write_fixture(100).await;
        desc.range = Some(ByteRange {
            start: 10,
            end: 19,
            total_length: 100,
        });

        let (resp, served) = respond(&desc, false, DEFAULT_CHUNK_SIZE).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            served,
            ServedSpan {
                status: StatusCode::PARTIAL_CONTENT,
                range: Some((10, 19)),
                bytes: 10,
            }
        );

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body.as_ref(), (10..20).collect::<Vec<u8>>().as_slice());
    }

    #[tokio::test]
    async fn test_respond_full_in_chunks() {
        let (_dir, desc) = write_fixture(100).await;

        let (resp, served) = respond(&desc, false, 16).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(served.range, None);
        assert_eq!(served.bytes, 100);

        let mut body = resp.into_body();
        let mut received = Vec::new();
        let mut frames = 0;
        while let Some(frame) = body.frame().await {
            let data = frame.unwrap().into_data().unwrap();
            assert!(data.len() <= 16);
            received.extend_from_slice(&data);
            frames += 1;
        }
        assert_eq!(received, (0..100).collect::<Vec<u8>>());
        assert!(frames >= 7);
    }

    #[tokio::test]
    async fn test_respond_head_has_empty_body() {
        let (_dir, desc) = write_fixture(100).await;

        let (resp, served) = respond(&desc, true, DEFAULT_CHUNK_SIZE).await.unwrap();
        assert_eq!(resp.headers()[CONTENT_LENGTH], "100");
        assert_eq!(served.bytes, 0);
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert!(body.is_empty());
    }

    /// Open descriptors of this process that refer to `path`
    #[cfg(target_os = "linux")]
    fn open_handles(path: &std::path::Path) -> usize {
        let target = std::fs::canonicalize(path).unwrap();
        std::fs::read_dir("/proc/self/fd")
            .unwrap()
            .filter_map(Result::ok)
            .filter_map(|fd| std::fs::read_link(fd.path()).ok())
            .filter(|link| *link == target)
            .count()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropping_body_mid_stream_closes_file() {
        let (_dir, desc) = write_fixture(100).await;
        let path = desc.entry.absolute_path.clone();
        assert_eq!(open_handles(&path), 0);

        let (resp, _) = respond(&desc, false, 8).await.unwrap();
        let mut body = resp.into_body();
        let first = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(first.as_ref(), &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(open_handles(&path), 1);

        drop(body);
        assert_eq!(open_handles(&path), 0);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_head_does_not_open_file() {
        let (_dir, desc) = write_fixture(100).await;
        let (resp, _) = respond(&desc, true, DEFAULT_CHUNK_SIZE).await.unwrap();
        assert_eq!(open_handles(&desc.entry.absolute_path), 0);
        drop(resp);
    }

    #[tokio::test]
    async fn test_respond_missing_file_is_io_error() {
        let desc = descriptor(100, None);
        assert!(respond(&desc, false, DEFAULT_CHUNK_SIZE).await.is_err());
    }
}

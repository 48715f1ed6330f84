//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: method validation, path decoding,
//! resolution against the shares and dispatch to listing or file streaming.

use crate::config::AppState;
use crate::handler::listing;
use crate::http::{self, sniff, stream, ResponseBody, StreamDescriptor};
use crate::logger::{self, AccessLogEntry};
use crate::sandbox::{Resolution, ResolvedEntry};
use hyper::header::{CONTENT_LENGTH, RANGE, REFERER, USER_AGENT};
use hyper::{Method, Request, Response, Version};
use percent_encoding::percent_decode_str;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Request context encapsulating information needed for request processing
pub struct RequestContext<'a> {
    /// Percent-decoded request path
    pub path: &'a str,
    pub is_head: bool,
    pub range_header: Option<&'a str>,
}

/// Response plus what the access log needs to know about it
struct Outcome {
    response: Response<ResponseBody>,
    body_bytes: u64,
    byte_range: Option<(u64, u64)>,
}

impl From<Response<ResponseBody>> for Outcome {
    fn from(response: Response<ResponseBody>) -> Self {
        let body_bytes = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        Self {
            response,
            body_bytes,
            byte_range: None,
        }
    }
}

/// Main entry point for HTTP request handling
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    remote_addr: SocketAddr,
) -> Result<Response<ResponseBody>, Infallible> {
    let started = Instant::now();
    let method = req.method();
    let is_head = *method == Method::HEAD;
    let raw_path = req.uri().path();
    let decoded = percent_decode_str(raw_path).decode_utf8();
    let path = decoded.as_deref().unwrap_or(raw_path);

    let mut outcome = if let Some(resp) = check_http_method(method) {
        Outcome::from(resp)
    } else if decoded.is_err() {
        logger::log_warning(&format!("Request path is not valid UTF-8: {raw_path}"));
        Outcome::from(http::build_400_response())
    } else {
        let ctx = RequestContext {
            path,
            is_head,
            range_header: header_str(&req, RANGE),
        };
        route_request(&ctx, &state).await.unwrap_or_else(|e| {
            logger::log_error(&format!("Failed to serve '{path}': {e}"));
            Outcome::from(http::build_500_response())
        })
    };
    if is_head {
        outcome.body_bytes = 0;
    }

    if state.access_log {
        let mut entry =
            AccessLogEntry::new(remote_addr.ip().to_string(), method.to_string(), path.to_string());
        entry.http_version = version_label(req.version()).to_string();
        entry.status = outcome.response.status().as_u16();
        entry.body_bytes = outcome.body_bytes;
        entry.byte_range = outcome.byte_range;
        entry.referer = header_str(&req, REFERER).map(ToString::to_string);
        entry.user_agent = header_str(&req, USER_AGENT).map(ToString::to_string);
        entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        logger::log_access(&entry, &state.config.logging.access_log_format);
    }

    Ok(outcome.response)
}

/// Check HTTP method and return 405 for anything but GET/HEAD
fn check_http_method(method: &Method) -> Option<Response<ResponseBody>> {
    match *method {
        Method::GET | Method::HEAD => None,
        _ => {
            logger::log_warning(&format!("Method not allowed: {method}"));
            Some(http::build_405_response())
        }
    }
}

/// Route request to the share index, a directory listing, or a file
async fn route_request(ctx: &RequestContext<'_>, state: &AppState) -> std::io::Result<Outcome> {
    if ctx.path == "/" {
        let html = listing::render("/", &state.resolver.share_index());
        return Ok(http::build_html_response(html, ctx.is_head).into());
    }

    match state.resolver.resolve(ctx.path).await? {
        Resolution::NotFound => {
            logger::log_debug(&format!("Not found: {}", ctx.path));
            Ok(http::build_404_response(ctx.is_head).into())
        }
        Resolution::Directory { children, .. } => {
            let html = listing::render(ctx.path, &children);
            Ok(http::build_html_response(html, ctx.is_head).into())
        }
        Resolution::File(entry) => serve_file(ctx, state, entry).await,
    }
}

/// Sniff the content type, apply the Range header and stream the file
async fn serve_file(
    ctx: &RequestContext<'_>,
    state: &AppState,
    entry: ResolvedEntry,
) -> std::io::Result<Outcome> {
    let mime_type = sniff::sniff_file(&entry.absolute_path)
        .await?
        .unwrap_or(http::FALLBACK_CONTENT_TYPE);
    let range = http::parse_range_header(ctx.range_header, entry.size);
    let desc = StreamDescriptor::new(entry, mime_type, range);

    let (response, served) =
        stream::respond(&desc, ctx.is_head, state.config.stream.chunk_size).await?;
    Ok(Outcome {
        response,
        body_bytes: served.bytes,
        byte_range: served.range,
    })
}

fn header_str<B>(req: &Request<B>, name: hyper::header::HeaderName) -> Option<&str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

const fn version_label(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2",
        Version::HTTP_3 => "3",
        _ => "1.1",
    }
}

//! HTTP response building module
//!
//! Every response shares one boxed body type so that fixed bodies and streamed
//! file bodies can flow through the same service.

use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Bytes;
use hyper::header::{ALLOW, CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Response, StatusCode};

/// Body type for every response produced by the server
pub type ResponseBody = UnsyncBoxBody<Bytes, std::io::Error>;

/// Fixed body sent with 404 responses
pub const NOT_FOUND_BODY: &str = "<h1>404 - Not Found</h1>";

/// Wrap in-memory bytes as a response body
pub fn full(data: impl Into<Bytes>) -> ResponseBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub fn empty() -> ResponseBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Build 404 Not Found response
pub fn build_404_response(is_head: bool) -> Response<ResponseBody> {
    build_fixed(
        StatusCode::NOT_FOUND,
        "text/html; charset=utf-8",
        NOT_FOUND_BODY,
        is_head,
    )
}

/// Build 400 Bad Request response
pub fn build_400_response() -> Response<ResponseBody> {
    build_fixed(
        StatusCode::BAD_REQUEST,
        "text/plain",
        "400 Bad Request",
        false,
    )
}

/// Build 405 Method Not Allowed response
pub fn build_405_response() -> Response<ResponseBody> {
    let mut resp = build_fixed(
        StatusCode::METHOD_NOT_ALLOWED,
        "text/plain",
        "405 Method Not Allowed",
        false,
    );
    resp.headers_mut()
        .insert(ALLOW, hyper::header::HeaderValue::from_static("GET, HEAD"));
    resp
}

/// Build 500 Internal Server Error response
pub fn build_500_response() -> Response<ResponseBody> {
    build_fixed(
        StatusCode::INTERNAL_SERVER_ERROR,
        "text/plain",
        "500 Internal Server Error",
        false,
    )
}

/// Build generic HTML response
pub fn build_html_response(content: String, is_head: bool) -> Response<ResponseBody> {
    let content_length = content.len();
    let body = if is_head { empty() } else { full(content) };

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .header(CONTENT_LENGTH, content_length)
        .body(body)
        .unwrap_or_else(|e| {
            log_build_error("HTML", &e);
            Response::new(empty())
        })
}

fn build_fixed(
    status: StatusCode,
    content_type: &'static str,
    text: &'static str,
    is_head: bool,
) -> Response<ResponseBody> {
    let body = if is_head { empty() } else { full(text) };
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, text.len())
        .body(body)
        .unwrap_or_else(|e| {
            log_build_error(status.as_str(), &e);
            Response::new(full(text))
        })
}

/// Log response build error
pub(crate) fn log_build_error(status: &str, error: &hyper::http::Error) {
    crate::logger::log_error(&format!("Failed to build {status} response: {error}"));
}

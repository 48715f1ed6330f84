//! HTTP protocol layer module
//!
//! Range parsing, content sniffing and response construction. Knows nothing about
//! routing or configuration.

pub mod range;
pub mod response;
pub mod sniff;
pub mod stream;

// Re-export commonly used types
pub use range::{parse_range_header, ByteRange};
pub use response::{
    build_400_response, build_404_response, build_405_response, build_500_response,
    build_html_response, ResponseBody,
};
pub use sniff::{classify, sniff_file, FALLBACK_CONTENT_TYPE};
pub use stream::{respond, ServedSpan, StreamDescriptor};

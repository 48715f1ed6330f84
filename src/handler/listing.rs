//! Directory listing page
//!
//! Plain HTML rendering of `{name, kind}` pairs. Directories come first, then files,
//! each group sorted by name.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::sandbox::{DirEntry, EntryKind};

/// Characters escaped inside one path segment of a link
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'&')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Render a listing for the decoded request path `title`
pub fn render(title: &str, entries: &[DirEntry]) -> String {
    let base = encode_path(title);
    let mut sorted: Vec<&DirEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| {
        (a.kind != EntryKind::Directory, &a.name).cmp(&(b.kind != EntryKind::Directory, &b.name))
    });

    let mut html = String::with_capacity(256 + entries.len() * 96);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{}</title>\n", escape_html(title)));
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!("<h1>{}</h1>\n<ul>\n", escape_html(title)));

    if title != "/" {
        let parent = base.rsplit_once('/').map_or("", |(p, _)| p);
        html.push_str(&format!("<li><a href=\"{parent}/\">../</a></li>\n"));
    }

    for entry in sorted {
        let suffix = if entry.kind == EntryKind::Directory {
            "/"
        } else {
            ""
        };
        html.push_str(&format!(
            "<li><a href=\"{base}/{}{suffix}\">{}{suffix}</a></li>\n",
            utf8_percent_encode(&entry.name, SEGMENT),
            escape_html(&entry.name),
        ));
    }

    html.push_str("</ul>\n</body>\n</html>\n");
    html
}

/// Re-encode a decoded path segment by segment, without a trailing slash
fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| format!("/{}", utf8_percent_encode(s, SEGMENT)))
        .collect()
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, kind: EntryKind) -> DirEntry {
        DirEntry {
            name: name.to_string(),
            kind,
        }
    }

    #[test]
    fn test_links_and_kinds() {
        let html = render(
            "/media/shows",
            &[entry("a.txt", EntryKind::File), entry("sub", EntryKind::Directory)],
        );
        assert!(html.contains("<a href=\"/media/shows/a.txt\">a.txt</a>"));
        assert!(html.contains("<a href=\"/media/shows/sub/\">sub/</a>"));
        assert!(html.contains("<a href=\"/media/\">../</a>"));
        // directories listed before files
        assert!(html.find("sub/").unwrap() < html.find("a.txt").unwrap());
    }

    #[test]
    fn test_names_are_escaped_and_encoded() {
        let html = render("/media", &[entry("<b> & #1.mp4", EntryKind::File)]);
        assert!(html.contains("href=\"/media/%3Cb%3E%20%26%20%231.mp4\""));
        assert!(html.contains(">&lt;b&gt; &amp; #1.mp4</a>"));
    }

    #[test]
    fn test_root_has_no_parent_link() {
        let html = render("/", &[entry("media", EntryKind::Directory)]);
        assert!(!html.contains("../"));
        assert!(html.contains("<a href=\"/media/\">media/</a>"));
    }
}

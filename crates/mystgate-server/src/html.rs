//! HTML helpers for generated pages.

use std::fmt::Write;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Characters left unescaped in URL paths.
const PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~')
    .remove(b'/');

/// Escape HTML special characters.
pub(crate) fn escape_html(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            _ => result.push(c),
        }
    }
    result
}

/// Percent-encode a decoded URL path, keeping `/` separators.
pub(crate) fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH).to_string()
}

/// Wrap `body` in a minimal standalone page.
///
/// `title` is escaped; `head` and `body` are inserted verbatim.
pub(crate) fn page(title: &str, head: &str, body: &str) -> String {
    let mut html = String::with_capacity(1024 + body.len());
    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str(
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n",
    );
    let _ = writeln!(html, "<title>{}</title>", escape_html(title));
    html.push_str(head);
    html.push_str("<style>\n");
    html.push_str("body { font-family: system-ui, sans-serif; margin: 2rem auto; max-width: 48rem; padding: 0 1rem; color: #1f2937; }\n");
    html.push_str("a { color: #2563eb; text-decoration: none; }\n");
    html.push_str("a:hover { text-decoration: underline; }\n");
    html.push_str("ul.listing { list-style: none; padding: 0; }\n");
    html.push_str("ul.listing li { padding: 0.3rem 0; border-bottom: 1px solid #e5e7eb; }\n");
    html.push_str(".badge { font-size: 0.75rem; background: #dbeafe; color: #1e40af; border-radius: 0.25rem; padding: 0.1rem 0.4rem; margin-left: 0.5rem; }\n");
    html.push_str(".notice { background: #fef3c7; padding: 0.75rem; border-radius: 0.25rem; }\n");
    html.push_str("pre.progress { background: #f3f4f6; padding: 0.75rem; white-space: pre-wrap; }\n");
    html.push_str("</style>\n</head>\n<body>\n");
    html.push_str(body);
    html.push_str("\n</body>\n</html>\n");
    html
}

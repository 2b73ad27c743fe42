//! HTML snippets handed to the HTML renderers.

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Wrap a body fragment in a minimal standalone document with `css`.
pub fn wrap_document(body: &str, css: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n{css}\n</style>\n</head>\n<body>\n{body}\n</body>\n</html>\n"
    )
}

/// Styles for word-processing documents rendered to PDF.
pub const DOCUMENT_CSS: &str = "\
body { font-family: 'Times New Roman', serif; font-size: 12pt; line-height: 1.5; margin: 20mm; }
h1 { font-size: 24pt; } h2 { font-size: 18pt; } h3 { font-size: 14pt; }
table { border-collapse: collapse; width: 100%; }
td, th { border: 1px solid #444; padding: 4px; }
img { max-width: 100%; }";

/// Styles for preformatted plain text rendered to PDF.
pub const TEXT_CSS: &str = "\
body { margin: 20mm; }
pre { font-family: 'Courier New', monospace; font-size: 10pt; white-space: pre-wrap; word-wrap: break-word; }";

/// Print styling for a spreadsheet table rasterised onto landscape pages.
pub const SHEET_CSS: &str = "\
table { border-collapse: collapse; table-layout: fixed; font-family: Arial, sans-serif; font-size: 10pt; }
td, th { width: 120px; border: 1px solid #999; padding: 4px; word-wrap: break-word; overflow-wrap: break-word; vertical-align: top; }
tr:first-child td, th { background: #e6e6e6; font-weight: bold; }";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_html("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn document_contains_body_and_css() {
        let doc = wrap_document("<p>hi</p>", "p { color: red; }");
        assert!(doc.starts_with("<!DOCTYPE html>"));
        assert!(doc.contains("<p>hi</p>"));
        assert!(doc.contains("p { color: red; }"));
    }
}

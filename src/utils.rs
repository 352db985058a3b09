//! Utility functions for the loader.
//!
//! - Document fingerprint and scope id derivation
//! - Line/column arithmetic and code frames for diagnostics
//! - JS string escaping (injection-safe)

use xxhash_rust::xxh3::xxh3_64;

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Short deterministic fingerprint of a list of values.
pub fn hash(values: &[&str]) -> String {
    let mut buf = String::new();
    for value in values {
        buf.push_str(value);
        buf.push('\0');
    }
    let digest = format!("{:016x}", xxh3_64(buf.as_bytes()));
    digest[..8].to_string()
}

/// Fingerprint of a document identity.
pub fn document_hash(filename: &str, version: &str) -> String {
    hash(&[filename, version])
}

/// Scope id derived from a document hash.
pub fn scope_id_from_hash(document_hash: &str) -> String {
    format!("data-v-{}", document_hash)
}

/// Scope id of a document: `"data-v-" + hash(filename, version)`.
pub fn scope_id(filename: &str, version: &str) -> String {
    scope_id_from_hash(&document_hash(filename, version))
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

/// 1-based line and column of a byte offset. Offsets past the end clamp.
pub fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let offset = clamp_to_boundary(source, offset);
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let column = source[line_start..offset].chars().count() + 1;
    (line, column)
}

fn clamp_to_boundary(source: &str, offset: usize) -> usize {
    let mut offset = offset.min(source.len());
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}

/// Render the lines around `start..end` with a gutter and caret markers.
pub fn code_frame(source: &str, start: (usize, usize), end: Option<(usize, usize)>) -> String {
    const CONTEXT: usize = 2;
    let lines: Vec<&str> = source.lines().collect();
    if lines.is_empty() {
        return String::new();
    }
    let (start_line, start_col) = start;
    let (end_line, end_col) = end.unwrap_or((start_line, start_col + 1));
    let first = start_line.saturating_sub(CONTEXT).max(1);
    let last = (end_line + CONTEXT).min(lines.len());
    let width = last.to_string().len();

    let mut out = String::new();
    for number in first..=last {
        let text = lines.get(number - 1).copied().unwrap_or("");
        let marked = number >= start_line && number <= end_line;
        out.push_str(&format!(
            "{} {:>width$} | {}\n",
            if marked { ">" } else { " " },
            number,
            text,
            width = width
        ));
        if marked {
            let from = if number == start_line { start_col } else { 1 };
            let to = if number == end_line {
                end_col.max(from + 1)
            } else {
                text.chars().count() + 1
            };
            out.push_str(&format!(
                "  {:>width$} | {}{}\n",
                "",
                " ".repeat(from.saturating_sub(1)),
                "^".repeat(to.saturating_sub(from).max(1)),
                width = width
            ));
        }
    }
    out.trim_end().to_string()
}

// ---------------------------------------------------------------------------
// Error formatting
// ---------------------------------------------------------------------------

pub fn format_error(message: &str, filename: &str) -> String {
    format!("{}\n{}", filename, message)
}

/// Format a message located at a 1-based line/column of `source`.
pub fn format_error_line_column(
    message: &str,
    filename: &str,
    source: &str,
    line: usize,
    column: usize,
) -> String {
    if line == 0 {
        return format_error(message, filename);
    }
    format!(
        "{}:{}:{}\n{}\n{}",
        filename,
        line,
        column,
        message,
        code_frame(source, (line, column), None)
    )
}

/// Format a message located at a byte range of `source`, best effort.
pub fn format_error_start_end(
    message: &str,
    filename: &str,
    source: &str,
    start: Option<usize>,
    end: Option<usize>,
) -> String {
    let Some(start) = start else {
        return format_error(message, filename);
    };
    let start_pos = line_column(source, start);
    let end_pos = end.filter(|e| *e > start).map(|e| line_column(source, e));
    format!(
        "{}:{}:{}\n{}\n{}",
        filename,
        start_pos.0,
        start_pos.1,
        message,
        code_frame(source, start_pos, end_pos)
    )
}

// ---------------------------------------------------------------------------
// JS String Escaping
// ---------------------------------------------------------------------------

/// Escape a string for safe embedding inside a JS double-quoted string literal.
pub fn escape_js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 16);
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

/// Escape text for HTML element content and attribute values.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_stable() {
        assert_eq!(hash(&["a.vue", "1.0.0"]), hash(&["a.vue", "1.0.0"]));
        assert_eq!(hash(&["a.vue", "1.0.0"]).len(), 8);
    }

    #[test]
    fn test_hash_separates_values() {
        assert_ne!(hash(&["ab", "c"]), hash(&["a", "bc"]));
    }

    #[test]
    fn test_scope_id() {
        let id = scope_id("/app.vue", "0.1.0");
        assert_eq!(id, format!("data-v-{}", hash(&["/app.vue", "0.1.0"])));
        assert_ne!(id, scope_id("/app.vue", "0.2.0"));
    }

    #[test]
    fn test_line_column() {
        let src = "ab\ncd\nef";
        assert_eq!(line_column(src, 0), (1, 1));
        assert_eq!(line_column(src, 4), (2, 2));
        assert_eq!(line_column(src, 100), (3, 3));
    }

    #[test]
    fn test_code_frame_marks_range() {
        let frame = code_frame("one\ntwo\nthree", (2, 2), Some((2, 4)));
        assert!(frame.contains("> 2 | two"));
        assert!(frame.contains("|  ^^"));
    }

    #[test]
    fn test_format_error_start_end_without_position() {
        assert_eq!(
            format_error_start_end("boom", "a.vue", "src", None, None),
            "a.vue\nboom"
        );
    }

    #[test]
    fn test_format_error_line_column() {
        let out = format_error_line_column("Unexpected token", "a.vue", "let x = ;", 1, 9);
        assert!(out.starts_with("a.vue:1:9\nUnexpected token"));
        assert!(out.contains("let x = ;"));
    }

    #[test]
    fn test_escape_js_string() {
        assert_eq!(escape_js_string(r#"he said "hi""#), r#"he said \"hi\""#);
        assert_eq!(escape_js_string("line1\nline2"), "line1\\nline2");
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<a & \"b\">"), "&lt;a &amp; &quot;b&quot;&gt;");
    }
}

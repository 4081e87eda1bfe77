//! Content-type detection from leading bytes.
//!
//! The declared content type of an upload is never trusted. Binary formats
//! are recognized by their magic bytes via [`infer`]. Anything `infer` does
//! not claim is classified here as text, SVG or HTML when it decodes as
//! UTF-8, and as `application/octet-stream` otherwise, never as the
//! declared value.

use infer::MatcherType;

/// Number of leading bytes inspected.
pub const SNIFF_WINDOW: usize = 512;

/// Fallback when no signature matches and the bytes are not text.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Detect the content type of a file from its first bytes.
#[must_use]
pub fn detect(prefix: &[u8]) -> &'static str {
    let head = &prefix[..prefix.len().min(SNIFF_WINDOW)];

    // Text matchers are skipped; SVG has to win over generic XML.
    if let Some(kind) = infer::get(head)
        && kind.matcher_type() != MatcherType::Text
    {
        return kind.mime_type();
    }
    if is_text(head) {
        return markup(head).unwrap_or("text/plain");
    }
    OCTET_STREAM
}

fn markup(head: &[u8]) -> Option<&'static str> {
    let text = String::from_utf8_lossy(head);
    let trimmed = text.trim_start_matches('\u{feff}').trim_start().to_ascii_lowercase();

    if trimmed.starts_with("<svg") || (trimmed.starts_with("<?xml") && trimmed.contains("<svg")) {
        return Some("image/svg+xml");
    }
    if trimmed.starts_with("<!doctype html") || trimmed.starts_with("<html") {
        return Some("text/html");
    }
    None
}

/// UTF-8 with no NUL bytes. A multi-byte character cut off by the window
/// edge still counts as text.
fn is_text(head: &[u8]) -> bool {
    if head.is_empty() || head.contains(&0) {
        return false;
    }
    match std::str::from_utf8(head) {
        Ok(_) => true,
        Err(e) => e.error_len().is_none() && head.len() - e.valid_up_to() < 4,
    }
}

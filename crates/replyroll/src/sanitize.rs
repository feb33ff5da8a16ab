//! Helpers for sanitizing untrusted names before they touch the filesystem
//! or tracing span attributes.

use std::path::Path;

/// Fallback name used when nothing usable survives sanitization.
pub const DEFAULT_ATTACHMENT_NAME: &str = "attachment";

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields: reveals the file name, not the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Sanitizes an attachment filename supplied by a remote sender.
///
/// - only the last path component (either separator style) is kept
/// - `..` sequences are removed
/// - characters outside ASCII alphanumerics and `.`, `-`, `_` become `_`
/// - leading/trailing `_` are trimmed
///
/// Falls back to [`DEFAULT_ATTACHMENT_NAME`] when the result is empty.
pub fn sanitize_attachment_name(name: &str) -> String {
    let trimmed = name.trim();
    let base = trimmed
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(trimmed);
    let base = base.replace("..", "");

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_matches('_');
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        DEFAULT_ATTACHMENT_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}

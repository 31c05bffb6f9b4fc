//! Helpers for sanitizing data before it enters tracing span attributes.
//!
//! Keeps full file paths and unbounded executor output out of spans and logs.

use std::path::Path;

/// Maximum number of characters of executor output kept in a log line.
pub const MAX_LOGGED_OUTPUT: usize = 2000;

/// Returns only the filename component of a path (no directory).
///
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Returns only the last segment of an object store key (`user/123_file.pdf` → `123_file.pdf`).
pub fn redact_key(key: &str) -> String {
    key.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Truncates captured process output for logging, keeping the tail where
/// tracebacks and final error lines usually are.
pub fn truncate_output(output: &str) -> String {
    let trimmed = output.trim();
    let count = trimmed.chars().count();
    if count <= MAX_LOGGED_OUTPUT {
        return trimmed.to_string();
    }

    let tail: String = trimmed.chars().skip(count - MAX_LOGGED_OUTPUT).collect();
    format!("…[{} chars omitted]{}", count - MAX_LOGGED_OUTPUT, tail)
}

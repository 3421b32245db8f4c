//! Path helpers: normalization, joining, and display-name escaping.
//!
//! Every path handled by the resolver is absolute and normalized: it starts
//! with `/`, has no empty, `.` or `..` segments, and has no trailing `/`
//! except for the root itself.

use crate::error::CoreError;

/// Path separator used by the mounted namespace.
pub const SEPARATOR: char = '/';

/// The root path.
pub const ROOT_PATH: &str = "/";

/// Escape a display name so it can be used as exactly one path segment.
///
/// `%` becomes `%25` and `/` becomes `%2F`; the names `.` and `..` are
/// written `%2E` and `%2E%2E`. [`unescape_name`] inverts the mapping.
pub fn escape_name(name: &str) -> String {
    match name {
        "." => return "%2E".to_string(),
        ".." => return "%2E%2E".to_string(),
        _ => {}
    }

    let mut escaped = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            SEPARATOR => escaped.push_str("%2F"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Reverse [`escape_name`].
pub fn unescape_name(segment: &str) -> String {
    match urlencoding::decode(segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => segment.to_string(),
    }
}

/// Normalize a path into canonical absolute form.
///
/// Repeated separators, `.` segments and a trailing separator are collapsed;
/// `..` drops the previous segment and stops at the root. Relative input is
/// taken as relative to the root.
pub fn normalize_path(path: &str) -> Result<String, CoreError> {
    if path.contains('\0') {
        return Err(CoreError::InvalidPath(path.to_string()));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(SEPARATOR) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Ok(ROOT_PATH.to_string());
    }

    let mut normalized = String::with_capacity(path.len() + 1);
    for segment in segments {
        normalized.push(SEPARATOR);
        normalized.push_str(segment);
    }
    Ok(normalized)
}

/// Join an already-escaped segment onto a normalized parent path.
pub fn join_path(parent: &str, segment: &str) -> String {
    if parent == ROOT_PATH {
        format!("/{}", segment)
    } else {
        format!("{}/{}", parent, segment)
    }
}

/// Split a normalized path into its segments. The root has none.
pub fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// Parent of a normalized path; the root is its own parent.
pub fn parent_path(path: &str) -> &str {
    match path.rfind(SEPARATOR) {
        Some(0) | None => ROOT_PATH,
        Some(idx) => &path[..idx],
    }
}

/// Last segment of a normalized path; empty for the root.
pub fn file_name(path: &str) -> &str {
    path.rsplit(SEPARATOR).next().unwrap_or("")
}

//! Domain identifiers, content hashing, and timestamp helpers shared across the crate.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Generate a fresh random identifier string.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Compute a deterministic SHA-256 hash of the given bytes, hex-encoded.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted as RFC 3339, used for all persisted timestamps.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Sanitize a collection or file name into a stable, filesystem-safe identifier.
///
/// Lowercases, replaces whitespace runs with `-`, and strips anything that is not
/// alphanumeric, `-`, or `_`. Rejects path traversal by construction (segments are dropped).
pub fn sanitize_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_sep = false;
    for ch in lowered.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('-');
            last_was_sep = true;
        }
    }
    out.trim_matches('-').to_string()
}

/// Identifier newtype for a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CollectionId(pub String);

/// Identifier newtype for a file within a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId(pub String);

/// Identifier newtype for a chunk within a file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(pub String);

impl std::fmt::Display for CollectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for ChunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Validate a relative folder path: no absolute paths, no `..` segments.
pub fn validate_relative_path(path: &str) -> Result<(), String> {
    if path.starts_with('/') || path.starts_with('\\') {
        return Err("path must be relative".to_string());
    }
    for segment in path.split(['/', '\\']) {
        if segment == ".." {
            return Err("path must not contain '..'".to_string());
        }
    }
    Ok(())
}

/// Allowed file extensions for collection files.
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["md", "txt", "json"];

/// Validate a filename's extension against the allow-list.
pub fn validate_extension(filename: &str) -> Result<(), String> {
    let ext = filename.rsplit('.').next().unwrap_or("");
    if ALLOWED_EXTENSIONS.contains(&ext.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(format!(
            "unsupported file extension '.{ext}'; allowed: {ALLOWED_EXTENSIONS:?}"
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_name_normalizes_whitespace_and_case() {
        assert_eq!(sanitize_name("  My Docs  "), "my-docs");
        assert_eq!(sanitize_name("a/b..c"), "a-b-c");
    }

    #[test]
    fn content_hash_is_stable() {
        let a = content_hash(b"hello");
        let b = content_hash(b"hello");
        assert_eq!(a, b);
        assert_ne!(a, content_hash(b"world"));
    }

    #[test]
    fn validate_relative_path_rejects_traversal() {
        assert!(validate_relative_path("../etc/passwd").is_err());
        assert!(validate_relative_path("/etc/passwd").is_err());
        assert!(validate_relative_path("docs/notes.md").is_ok());
    }

    #[test]
    fn validate_extension_enforces_allow_list() {
        assert!(validate_extension("notes.md").is_ok());
        assert!(validate_extension("notes.exe").is_err());
    }
}

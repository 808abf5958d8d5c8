//! Error types for the ripplecache domain.
//!
//! Uses `thiserror` for ergonomic error definitions. The per-turn update
//! cycle is infallible; errors only arise at the edges (parsing keys handed
//! in as strings, restoring persisted tracker state).

use thiserror::Error;

/// The top-level error type for all ripplecache operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Key parsing ---
    #[error("Invalid item key: {0}")]
    Key(#[from] KeyParseError),

    // --- Snapshot restore ---
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyParseError {
    #[error("missing type tag in {0:?} (expected file:, symbol: or history:)")]
    MissingTag(String),

    #[error("unknown type tag {tag:?} in {key:?}")]
    UnknownTag { tag: String, key: String },

    #[error("history index {0:?} is not a number")]
    BadHistoryIndex(String),

    #[error("empty path in {0:?}")]
    EmptyPath(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("duplicate key in snapshot: {0}")]
    DuplicateKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_error_displays_correctly() {
        let err = Error::Key(KeyParseError::UnknownTag {
            tag: "dir".into(),
            key: "dir:src".into(),
        });
        assert!(err.to_string().contains("dir"));
        assert!(err.to_string().contains("Invalid item key"));
    }

    #[test]
    fn snapshot_version_error_names_both_versions() {
        let err = Error::Snapshot(SnapshotError::UnsupportedVersion {
            found: 7,
            expected: 1,
        });
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains('1'));
    }

    #[test]
    fn json_errors_convert_with_question_mark() {
        fn parse(json: &str) -> Result<serde_json::Value> {
            Ok(serde_json::from_str(json)?)
        }
        let err = parse("{oops").unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.to_string().starts_with("Serialization error"));
    }
}

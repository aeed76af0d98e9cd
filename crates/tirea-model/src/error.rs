//! Error types for tirea-model operations.

use crate::Path;
use thiserror::Error;

/// Result type alias for tirea-model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while recording, replaying or observing state.
#[derive(Debug, Error)]
pub enum ModelError {
    /// An update callback ended on a read that no write consumed.
    #[error("update statement ends without a write: {path}")]
    IncompleteUpdateStatement {
        /// The dangling read path.
        path: Path,
    },

    /// A key or index along the path does not currently exist.
    #[error("missing path element: {path}")]
    MissingPathElement {
        /// The path up to and including the missing element.
        path: Path,
    },

    /// The access kind does not fit the value found at the path.
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The path where the mismatch occurred.
        path: Path,
        /// The expected kind.
        expected: &'static str,
        /// The actual kind found.
        found: &'static str,
    },

    /// The state root is not a structured record.
    #[error("state must be a map or list, found {found}")]
    InvalidStateType {
        /// The kind that was supplied.
        found: &'static str,
    },

    /// Invalid operation error.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of what went wrong.
        message: String,
    },

    /// The channel being awaited was dropped before it emitted.
    #[error("channel dropped before emitting")]
    Disconnected,

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ModelError {
    /// Create an incomplete update statement error.
    #[inline]
    pub fn incomplete_statement(path: Path) -> Self {
        ModelError::IncompleteUpdateStatement { path }
    }

    /// Create a missing path element error.
    #[inline]
    pub fn missing(path: Path) -> Self {
        ModelError::MissingPathElement { path }
    }

    /// Create a type mismatch error.
    #[inline]
    pub fn type_mismatch(path: Path, expected: &'static str, found: &'static str) -> Self {
        ModelError::TypeMismatch {
            path,
            expected,
            found,
        }
    }

    /// Create an invalid state type error.
    #[inline]
    pub fn invalid_state_type(found: &'static str) -> Self {
        ModelError::InvalidStateType { found }
    }

    /// Create an invalid operation error.
    #[inline]
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        ModelError::InvalidOperation {
            message: message.into(),
        }
    }

    /// Add a path prefix to this error.
    ///
    /// Operation-level errors only know their own segment; callers walking a
    /// longer path prepend the segments already traversed.
    pub fn with_prefix(self, prefix: &Path) -> Self {
        match self {
            ModelError::MissingPathElement { path } => ModelError::MissingPathElement {
                path: prefix.join(&path),
            },
            ModelError::TypeMismatch {
                path,
                expected,
                found,
            } => ModelError::TypeMismatch {
                path: prefix.join(&path),
                expected,
                found,
            },
            ModelError::IncompleteUpdateStatement { path } => {
                ModelError::IncompleteUpdateStatement {
                    path: prefix.join(&path),
                }
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;

    #[test]
    fn test_error_display() {
        let err = ModelError::missing(path!("d", "key"));
        assert_eq!(err.to_string(), "missing path element: $.d.key");

        let err = ModelError::type_mismatch(path!("value"), "map", "integer");
        assert!(err.to_string().contains("expected map, found integer"));
    }

    #[test]
    fn test_with_prefix() {
        let err = ModelError::missing(path!("name")).with_prefix(&path!("users", 0usize));
        match err {
            ModelError::MissingPathElement { path } => {
                assert_eq!(path.to_string(), "$.users[0].name")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

//! Gateway error type.

use thiserror::Error;

/// Convenience alias for gateway results.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistence gateway failure.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Row does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Row kind (`"definition"` or `"instance"`).
        kind: &'static str,
        /// The id that failed to resolve.
        id: String,
    },

    /// Create collided with an existing row.
    #[error("duplicate instance id: {0}")]
    Duplicate(String),

    /// Backend failure that is not tied to a specific row.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// SQLite-level failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool failure.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Row (de)serialization failure for JSON columns.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored timestamp column failed to parse.
    #[error("invalid timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

impl StoreError {
    /// Shorthand for a missing definition row.
    #[must_use]
    pub fn definition_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "definition",
            id: id.into(),
        }
    }

    /// Shorthand for a missing instance row.
    #[must_use]
    pub fn instance_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "instance",
            id: id.into(),
        }
    }

    /// Whether this error is a missing-row error (as opposed to a backend
    /// failure).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_kind_and_id() {
        let err = StoreError::instance_not_found("inst-1");
        assert_eq!(err.to_string(), "instance not found: inst-1");
        assert!(err.is_not_found());
    }

    #[test]
    fn duplicate_message() {
        let err = StoreError::Duplicate("inst-1".into());
        assert!(err.to_string().contains("inst-1"));
        assert!(!err.is_not_found());
    }
}

//! Error types for the treeroots core library.

use std::path::PathBuf;

/// Top-level error enum for the treeroots core library.
#[derive(Debug, thiserror::Error)]
pub enum TreeRootsError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Embedding generation failed ({}): {message}", retry_label(.retryable))]
    EmbeddingGenerationFailed { retryable: bool, message: String },

    #[error("Language model failed ({}): {message}", retry_label(.retryable))]
    LanguageModelFailed { retryable: bool, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn retry_label(retryable: &bool) -> &'static str {
    if *retryable {
        "transient"
    } else {
        "fatal"
    }
}

impl TreeRootsError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TreeRootsError::EmbeddingGenerationFailed { retryable, .. }
            | TreeRootsError::LanguageModelFailed { retryable, .. } => *retryable,
            TreeRootsError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

pub type TreeRootsResult<T> = Result<T, TreeRootsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_failure_display_names_class() {
        let transient = TreeRootsError::EmbeddingGenerationFailed {
            retryable: true,
            message: "rate limited".to_string(),
        };
        assert_eq!(
            transient.to_string(),
            "Embedding generation failed (transient): rate limited"
        );
        assert!(transient.is_retryable());

        let fatal = TreeRootsError::EmbeddingGenerationFailed {
            retryable: false,
            message: "bad key".to_string(),
        };
        assert!(fatal.to_string().contains("(fatal)"));
        assert!(!fatal.is_retryable());
    }

    #[test]
    fn test_not_a_repository_is_not_retryable() {
        let err = TreeRootsError::NotARepository(PathBuf::from("/tmp/nowhere"));
        assert!(err.to_string().contains("/tmp/nowhere"));
        assert!(!err.is_retryable());
    }
}

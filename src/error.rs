use thiserror::Error;

/// Common error type for the archiver.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Registry database error.
    ///
    /// Wraps errors from the underlying SQLite connection. The registry is
    /// the only transactional store in the system, so these are reported
    /// per feed and never abort a whole batch.
    #[error("registry error: {0}")]
    Database(String),

    /// The registry's key attribute could not be determined.
    ///
    /// Unlike per-feed registry errors this aborts the whole batch: without
    /// a partition key there is no safe way to address any record.
    #[error("registry schema error: {0}")]
    Schema(String),

    /// Article archive write or listing failure.
    #[error("archive error: {0}")]
    Archive(String),

    /// HTTP error while fetching a feed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<tokio_rusqlite::Error> for AppError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

/// Result type alias for archiver operations.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_display() {
        let err = AppError::Schema("no primary key column".to_string());
        assert_eq!(err.to_string(), "registry schema error: no primary key column");
    }

    #[test]
    fn test_archive_error_display() {
        let err = AppError::Archive("disk full".to_string());
        assert_eq!(err.to_string(), "archive error: disk full");
    }
}

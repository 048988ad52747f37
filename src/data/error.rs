//! Unified error type for data layer
//!
//! Wraps backend-specific errors while preserving which backend generated them.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    #[error("SQLite error: {0}")]
    Sqlite(sqlx::Error),

    #[error("PostgreSQL error: {0}")]
    Postgres(sqlx::Error),

    #[error("Schema setup failed on {backend}: {error}")]
    SchemaSetupFailed { backend: &'static str, error: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Query timeout after {timeout_secs}s on {backend}")]
    Timeout {
        backend: &'static str,
        timeout_secs: u64,
    },

    #[error("Connection pool exhausted on {backend}")]
    PoolExhausted { backend: &'static str },

    #[error("Backend {backend} is not available: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },

    #[error("Not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl DataError {
    pub fn from_sqlite(e: sqlx::Error) -> Self {
        Self::Sqlite(e)
    }

    pub fn from_postgres(e: sqlx::Error) -> Self {
        Self::Postgres(e)
    }

    pub fn schema_setup_failed(backend: &'static str, error: impl Into<String>) -> Self {
        Self::SchemaSetupFailed {
            backend,
            error: error.into(),
        }
    }

    pub fn timeout(backend: &'static str, timeout_secs: u64) -> Self {
        Self::Timeout {
            backend,
            timeout_secs,
        }
    }

    pub fn pool_exhausted(backend: &'static str) -> Self {
        Self::PoolExhausted { backend }
    }

    pub fn backend_unavailable(backend: &'static str, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend,
            reason: reason.into(),
        }
    }

    /// Whether a retry might succeed without caller intervention.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::PoolExhausted { .. } => true,
            Self::Sqlite(e) | Self::Postgres(e) => {
                matches!(
                    e,
                    sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
                )
            }
            _ => false,
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::Postgres(_) => "postgres",
            Self::SchemaSetupFailed { backend, .. } => backend,
            Self::Timeout { backend, .. } => backend,
            Self::PoolExhausted { backend } => backend,
            Self::BackendUnavailable { backend, .. } => backend,
            Self::Config(_) | Self::Io(_) | Self::NotFound | Self::Conflict(_) => "unknown",
        }
    }
}

impl From<sqlx::Error> for DataError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::RowNotFound => Self::NotFound,
            _ => Self::Sqlite(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_setup_failed_display() {
        let err = DataError::schema_setup_failed("postgres", "syntax error");
        assert_eq!(
            err.to_string(),
            "Schema setup failed on postgres: syntax error"
        );
    }

    #[test]
    fn test_timeout_error_display() {
        let err = DataError::timeout("sqlite", 30);
        assert_eq!(err.to_string(), "Query timeout after 30s on sqlite");
    }

    #[test]
    fn test_backend_method() {
        assert_eq!(DataError::timeout("sqlite", 30).backend(), "sqlite");
        assert_eq!(DataError::pool_exhausted("postgres").backend(), "postgres");
    }

    #[test]
    fn test_is_transient() {
        assert!(DataError::timeout("sqlite", 30).is_transient());
        assert!(DataError::pool_exhausted("postgres").is_transient());
        assert!(!DataError::Config("bad config".into()).is_transient());
    }
}

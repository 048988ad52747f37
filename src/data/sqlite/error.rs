//! SQLite-specific error type, convertible into the unified [`crate::data::DataError`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SqliteError {
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SqliteError> for crate::data::DataError {
    fn from(e: SqliteError) -> Self {
        match e {
            SqliteError::Sqlx(sqlx::Error::RowNotFound) => Self::NotFound,
            SqliteError::Sqlx(err) => Self::Sqlite(err),
            SqliteError::Migration(msg) => Self::schema_setup_failed("sqlite", msg),
            SqliteError::Io(err) => Self::Io(err),
        }
    }
}

//! PostgreSQL-specific error type, convertible into the unified [`crate::data::DataError`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PostgresError {
    #[error("PostgreSQL error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl From<PostgresError> for crate::data::DataError {
    fn from(e: PostgresError) -> Self {
        match e {
            PostgresError::Sqlx(sqlx::Error::RowNotFound) => Self::NotFound,
            PostgresError::Sqlx(err) => Self::Postgres(err),
            PostgresError::Migration(msg) => Self::schema_setup_failed("postgres", msg),
        }
    }
}

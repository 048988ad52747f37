//! Data storage layer
//!
//! Two interchangeable backends implement the same [`traits::Repository`]
//! capability set:
//! - `sqlite` - embedded, single-process deployments (default)
//! - `postgres` - shared-server deployments
//!
//! [`DbService`] is the tagged selection made once at startup from
//! [`crate::core::config::DbBackend`]; callers go through
//! `DbService::repository()` rather than matching on the backend directly.

pub mod error;
pub mod postgres;
pub mod sqlite;
pub mod traits;
pub mod types;

pub use error::DataError;
pub use traits::{ChannelRepo, MessageRepo, Repository, SearchRepo, UserRepo};

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::config::{DbBackend, PostgresConfig};
use crate::core::storage::AppStorage;
use postgres::PostgresStore;
use sqlite::SqliteStore;

/// Transactional database service, selected once at startup.
///
/// Wraps the backend-specific store and provides a unified interface for
/// lifecycle management (checkpoint/close/background tasks) plus access to
/// the shared [`Repository`] trait object for all read/write operations.
pub enum DbService {
    Sqlite(Arc<SqliteStore>),
    Postgres(Arc<PostgresStore>),
}

impl DbService {
    pub async fn init(
        backend: DbBackend,
        storage: &AppStorage,
        postgres_config: Option<&PostgresConfig>,
        search_enabled: bool,
    ) -> Result<Self, DataError> {
        match backend {
            DbBackend::Sqlite => {
                let store = SqliteStore::init_with_search(storage, search_enabled).await?;
                Ok(Self::Sqlite(Arc::new(store)))
            }
            DbBackend::Postgres => {
                let config = postgres_config.ok_or_else(|| {
                    DataError::Config("PostgreSQL configuration required".to_string())
                })?;
                let store = PostgresStore::init(config, search_enabled).await?;
                Ok(Self::Postgres(Arc::new(store)))
            }
        }
    }

    /// Get the shared repository trait object for data operations.
    pub fn repository(&self) -> Arc<dyn Repository + Send + Sync> {
        match self {
            Self::Sqlite(s) => s.clone() as Arc<dyn Repository + Send + Sync>,
            Self::Postgres(p) => p.clone() as Arc<dyn Repository + Send + Sync>,
        }
    }

    pub async fn checkpoint(&self) -> Result<(), DataError> {
        match self {
            Self::Sqlite(s) => s.checkpoint().await,
            Self::Postgres(_) => Ok(()),
        }
    }

    pub async fn close(&self) {
        match self {
            Self::Sqlite(s) => s.close().await,
            Self::Postgres(p) => p.close().await,
        }
    }

    pub fn start_checkpoint_task(&self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        match self {
            Self::Sqlite(s) => Arc::clone(s).start_checkpoint_task(shutdown_rx),
            Self::Postgres(p) => Arc::clone(p).start_health_check_task(shutdown_rx),
        }
    }

    pub fn backend(&self) -> DbBackend {
        match self {
            Self::Sqlite(_) => DbBackend::Sqlite,
            Self::Postgres(_) => DbBackend::Postgres,
        }
    }

    pub fn search_indexed(&self) -> bool {
        match self {
            Self::Sqlite(s) => s.search_indexed(),
            Self::Postgres(p) => p.search_indexed(),
        }
    }
}

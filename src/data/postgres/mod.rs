//! PostgreSQL database store
//!
//! Shared-server backend: connection pooling via `sqlx::PgPool`, full-text
//! search via a generated `tsvector` column, no local checkpoint concept (the
//! background task instead runs a periodic connectivity health check).

pub mod error;
mod migrations;
mod repository;
pub mod schema;

pub use error::PostgresError;
pub use sqlx::PgPool;

use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::config::PostgresConfig;
use crate::core::constants::{
    POSTGRES_ACQUIRE_TIMEOUT_SECS, POSTGRES_HEALTH_CHECK_INTERVAL_SECS, POSTGRES_IDLE_TIMEOUT_SECS,
    POSTGRES_MAX_CONNECTIONS, POSTGRES_MIN_CONNECTIONS,
};

pub struct PostgresStore {
    pool: PgPool,
    search_indexed: bool,
}

impl PostgresStore {
    pub async fn init(config: &PostgresConfig, search_indexed: bool) -> Result<Self, PostgresError> {
        let pool = PgPoolOptions::new()
            .max_connections(POSTGRES_MAX_CONNECTIONS)
            .min_connections(POSTGRES_MIN_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(POSTGRES_ACQUIRE_TIMEOUT_SECS))
            .idle_timeout(Duration::from_secs(POSTGRES_IDLE_TIMEOUT_SECS))
            .connect(&config.url)
            .await?;

        migrations::run_migrations(&pool).await?;

        tracing::debug!("PostgresStore initialized");
        Ok(Self {
            pool,
            search_indexed,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn search_indexed(&self) -> bool {
        self.search_indexed
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("PostgreSQL pool closed");
    }

    pub fn start_health_check_task(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let db = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(POSTGRES_HEALTH_CHECK_INTERVAL_SECS));
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("PostgreSQL health-check task shutting down");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if let Err(e) = sqlx::query("SELECT 1").execute(&db.pool).await {
                            tracing::warn!("PostgreSQL health check failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}

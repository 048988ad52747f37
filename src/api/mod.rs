//! HTTP API: list/search endpoints, operator channel CRUD, and the live SSE feed.

pub mod middleware;
pub mod routes;
mod server;
pub mod types;

pub use server::ApiServer;

use std::sync::Arc;

use tokio::sync::watch;

use crate::data::traits::Repository;
use crate::domain::bus::LiveBus;
use crate::domain::processor::Processor;

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository + Send + Sync>,
    pub bus: Arc<LiveBus>,
    pub processor: Arc<Processor>,
    pub search_indexed: bool,
    pub shutdown_rx: watch::Receiver<bool>,
}

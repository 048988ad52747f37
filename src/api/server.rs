//! API server initialization

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::middleware::{self, AllowedOrigins};
use super::{AppState, routes};
use crate::core::CoreApp;
use crate::core::constants::DEFAULT_BODY_LIMIT;

const HTTP_READ_TIMEOUT_SECS: u64 = 15;

pub struct ApiServer {
    app: CoreApp,
    allowed_origins: AllowedOrigins,
}

impl ApiServer {
    pub fn new(app: CoreApp) -> Self {
        let allowed_origins = AllowedOrigins::new(&app.config.server.host, app.config.server.port);
        Self { app, allowed_origins }
    }

    /// Binds and serves until the shutdown signal fires, then hands `CoreApp`
    /// back so the caller can run the rest of the teardown sequence.
    pub async fn start(self) -> Result<CoreApp> {
        let Self { app, allowed_origins } = self;

        let shutdown = app.shutdown.clone();
        let host = app.config.server.host.clone();
        let port = app.config.server.port;
        let addr = SocketAddr::new(host.parse()?, port);

        let state = AppState {
            repo: app.database.repository(),
            bus: app.bus.clone(),
            processor: app.processor.clone(),
            search_indexed: app.database.search_indexed(),
            shutdown_rx: app.shutdown.subscribe(),
        };

        // The live SSE stream self-polices via its own heartbeat and must
        // never be cut by the blanket request timeout, so it's layered
        // separately from the rest of the surface.
        let timed = routes::router().layer(TimeoutLayer::new(Duration::from_secs(HTTP_READ_TIMEOUT_SECS)));
        let live = routes::live_router();

        let router = Router::new()
            .merge(timed)
            .merge(live)
            .with_state(state)
            .fallback(middleware::handle_404)
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new())
            .layer(middleware::cors(&allowed_origins))
            .layer(DefaultBodyLimit::max(DEFAULT_BODY_LIMIT));

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        Ok(app)
    }
}

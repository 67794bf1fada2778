// HTTP API
// JSON endpoints for asking, retrieving and triggering ingestion

pub mod error;
pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::ingest::Ingestor;
use crate::rag::QueryOrchestrator;

pub use error::ApiError;

/// Shared handles used by every request
pub struct AppState {
    pub orchestrator: QueryOrchestrator,
    /// Absent when no feed source is configured
    pub ingestor: Option<Arc<Ingestor>>,
}

#[inline]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/ask", post(handlers::ask))
        .route("/api/retrieve", post(handlers::retrieve))
        .route("/api/ingest", post(handlers::ingest))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the API on `addr` until `shutdown` resolves
#[inline]
pub async fn serve<F>(state: Arc<AppState>, addr: SocketAddr, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

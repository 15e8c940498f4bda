//! verimld - HTTP front end for the veriml pipeline
//!
//! ## Routes
//!
//! - `POST /models`: multipart upload (`task_id`, `model`), runs the pipeline
//! - `GET /models/:task_id/status`: latest status record
//! - `GET /models/:task_id/artifacts/:artifact`: raw artifact bytes
//! - `GET /health`: liveness

pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;
use veriml_core::PipelineCoordinator;

/// Default cap on a request body (the model upload).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 256 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<PipelineCoordinator>,
}

impl AppState {
    pub fn new(coordinator: PipelineCoordinator) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
        }
    }
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/models", post(handlers::upload_model))
        .route("/models/:task_id/status", get(handlers::task_status))
        .route("/models/:task_id/artifacts/:artifact", get(handlers::task_artifact))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `app` on `addr` until Ctrl-C.
pub async fn serve(addr: SocketAddr, app: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "verimld listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

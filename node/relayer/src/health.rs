use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::status::RelayerStatus;

/// Liveness surface for orchestration/monitoring
pub fn routes(status: Arc<RelayerStatus>) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(status)
}

async fn health(State(status): State<Arc<RelayerStatus>>) -> impl IntoResponse {
    let snapshot = status.snapshot();
    let code = if snapshot.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(snapshot))
}

/// Serve the health endpoint until shutdown is signalled
pub async fn serve(
    port: u16,
    status: Arc<RelayerStatus>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("health endpoint listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(routes(status).into_make_service())
        .with_graceful_shutdown(async move {
            while shutdown.changed().await.is_ok() {
                if *shutdown.borrow() {
                    break;
                }
            }
        })
        .await?;

    Ok(())
}

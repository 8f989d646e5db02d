mod error;
mod handlers;

use crate::engine::Engine;
use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/extract", post(handlers::extract_info))
        .route("/queue-download", post(handlers::queue_download))
        .route("/status/:task_id", get(handlers::get_status))
        .route("/file/:file_id", get(handlers::get_file))
        .route("/file/:folder/:file", get(handlers::get_folder_file));

    Router::new()
        .nest("/api", api_routes)
        .route("/healthz", get(handlers::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("🚀 Listening on http://{}", addr);
    info!("Health check: http://{}/healthz", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

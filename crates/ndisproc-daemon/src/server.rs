//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{delete, get},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api;
use crate::state::AppState;

/// Build the router serving the endpoint namespace
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/proc", get(api::list_namespace))
        .route(
            "/api/proc/{*path}",
            get(api::read_entry).put(api::write_entry),
        )
        .route("/api/devices/{name}", delete(api::remove_device))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server until interrupted, then tear down every device
pub async fn run(state: Arc<AppState>, bind: &str) -> Result<()> {
    let app = router(state.clone());
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, protocol = "HTTP", "Starting endpoint server");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Couldn't listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("Shutting down");
    tokio::task::spawn_blocking(move || state.shutdown()).await?;
    Ok(())
}

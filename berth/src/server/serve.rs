//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::BerthError;
use crate::server::handlers::{
    get_deployment_handler, health_handler, list_deployments_handler, logs_handler,
    trigger_handler,
};
use crate::server::state::ServerState;

/// Routes of the local HTTP surface
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health
        .route("/health", get(health_handler))
        // Applications
        .route(
            "/applications/{id}/deployments",
            post(trigger_handler).get(list_deployments_handler),
        )
        // Deployments
        .route("/deployments/{id}", get(get_deployment_handler))
        .route("/deployments/{id}/logs", get(logs_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), BerthError>>, BerthError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| BerthError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| BerthError::ServerError(e.to_string()))
    });

    Ok(handle)
}

//! HTTP server for the Prometheus metrics and site status endpoints.

use crate::metrics::MetricsRegistry;
use crate::registry::SiteRegistry;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use sitecheck::SiteId;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<MetricsRegistry>,
    pub registry: Arc<SiteRegistry>,
}

/// HTTP server for metrics and read-only site status
pub struct StatusServer {
    state: AppState,
    listen_addr: String,
}

impl StatusServer {
    /// Create a new status server
    pub fn new(state: AppState, listen_addr: String) -> Self {
        Self { state, listen_addr }
    }

    /// Build the router
    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/sites", get(sites_handler))
            .route("/sites/:id", get(site_handler))
            .route("/logs", get(logs_handler))
            .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
            .with_state(state)
    }

    /// Run the HTTP server
    pub async fn run(self) -> std::io::Result<()> {
        info!(listen_addr = %self.listen_addr, "Starting status HTTP server");

        let app = Self::router(self.state);
        let listener = TcpListener::bind(&self.listen_addr).await?;
        info!(listen_addr = %self.listen_addr, "Status server listening");

        axum::serve(listener, app).await
    }
}

/// Handler for /metrics endpoint
async fn metrics_handler(State(state): State<AppState>) -> Response {
    let mut buffer = String::new();
    if let Err(e) = encode(&mut buffer, &state.metrics.registry) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        buffer,
    )
        .into_response()
}

/// Handler for /sites
async fn sites_handler(State(state): State<AppState>) -> Response {
    Json(state.registry.sites().await).into_response()
}

/// Handler for /sites/:id
async fn site_handler(State(state): State<AppState>, Path(id): Path<SiteId>) -> Response {
    match state.registry.site(id).await {
        Some(site) => Json(site).into_response(),
        None => (StatusCode::NOT_FOUND, format!("Site {} not found", id)).into_response(),
    }
}

/// Handler for /logs
async fn logs_handler(State(state): State<AppState>) -> Response {
    Json(state.registry.logs()).into_response()
}

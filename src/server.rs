//! HTTP surface of the dashboard.
//!
//! Every page request is one independent run against the warehouse.

use crate::dashboard::{load_dashboard, DashboardRenderer};
use crate::db::WarehouseConnector;
use crate::error::{DashboardError, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Shared state for the request handlers.
pub struct AppState {
    connector: Arc<dyn WarehouseConnector>,
    renderer: DashboardRenderer,
}

impl AppState {
    /// Creates the handler state.
    pub fn new(connector: Arc<dyn WarehouseConnector>, renderer: DashboardRenderer) -> Self {
        Self {
            connector,
            renderer,
        }
    }
}

/// Builds the dashboard routes.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(dashboard_page))
        .route("/api/dashboard", get(dashboard_json))
        .route("/healthz", get(healthz))
        .with_state(state)
}

/// Serves the dashboard until the process is stopped.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| DashboardError::config(format!("Cannot bind {addr}: {e}")))?;
    info!("Dashboard listening on http://{}", addr);

    axum::serve(listener, router(state))
        .await
        .map_err(|e| DashboardError::internal(format!("HTTP server failed: {e}")))
}

/// Status code for a failed run.
pub fn error_status(error: &DashboardError) -> StatusCode {
    match error {
        DashboardError::Connection(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn dashboard_page(State(state): State<Arc<AppState>>) -> Response {
    let page = match load_dashboard(state.connector.as_ref()).await {
        Ok(dashboard) => state.renderer.render(&dashboard).map(|html| (StatusCode::OK, html)),
        Err(e) => {
            error!("{}: {}", e.category(), e.message());
            state
                .renderer
                .render_error(&e)
                .map(|html| (error_status(&e), html))
        }
    };

    match page {
        Ok((status, html)) => (status, Html(html)).into_response(),
        Err(e) => {
            error!("{}: {}", e.category(), e.message());
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn dashboard_json(State(state): State<Arc<AppState>>) -> Response {
    match load_dashboard(state.connector.as_ref()).await {
        Ok(dashboard) => Json(dashboard).into_response(),
        Err(e) => {
            error!("{}: {}", e.category(), e.message());
            (
                error_status(&e),
                Json(json!({ "category": e.category(), "message": e.message() })),
            )
                .into_response()
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

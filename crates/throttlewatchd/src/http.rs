//! HTTP surface
//!
//! Read-only views of the status cache plus the on-demand report trigger.
//! Handlers never wait on a running cycle: they read the last published
//! snapshot.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{Local, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use throttlewatch_core::StatusCache;
use tracing::{error, warn};

use crate::report::Reporter;

/// Built-in dashboard served when no dashboard file is configured
const BUILTIN_DASHBOARD: &str = include_str!("dashboard.html");

/// Shared state of all handlers
#[derive(Clone)]
pub struct AppState {
    pub cache: StatusCache,
    pub reporter: Option<Reporter>,
    pub telegram_enabled: bool,
    pub dashboard_path: Option<Arc<str>>,
}

/// Lookup parameters of the webhook
#[derive(Debug, Default, Deserialize)]
pub struct LookupParams {
    #[serde(rename = "ipv4IP")]
    ipv4_ip: Option<String>,
    resource_id: Option<String>,
}

impl LookupParams {
    fn resource_id(&self) -> Option<&str> {
        self.ipv4_ip
            .as_deref()
            .or(self.resource_id.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Build the router
pub fn router(state: AppState, webhook_path: &str) -> Router {
    Router::new()
        .route(webhook_path, get(webhook).post(webhook))
        .route("/api/status", get(api_status))
        .route("/api/vertex/report", get(vertex_report))
        .route("/health", get(health))
        .route("/", get(dashboard))
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Per-resource lookup
pub async fn webhook(State(state): State<AppState>, Query(params): Query<LookupParams>) -> Response {
    let Some(resource_id) = params.resource_id() else {
        return error_response(StatusCode::BAD_REQUEST, "Missing ipv4IP parameter");
    };

    let snapshot = state.cache.snapshot().await;
    match snapshot.view(resource_id, Utc::now()) {
        Some(view) => Json(view).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("No information for IP {}", resource_id),
        ),
    }
}

/// All cached resources with aggregate counts
pub async fn api_status(State(state): State<AppState>) -> Response {
    let snapshot = state.cache.snapshot().await;
    Json(json!({
        "success": true,
        "data": snapshot.report(Utc::now()),
    }))
    .into_response()
}

/// Send the run report now
pub async fn vertex_report(State(state): State<AppState>) -> Response {
    if !state.telegram_enabled {
        return error_response(StatusCode::BAD_REQUEST, "Telegram is not configured");
    }
    let Some(reporter) = state.reporter else {
        return error_response(StatusCode::BAD_REQUEST, "Vertex is not configured");
    };

    match reporter.send().await {
        Ok(()) => Json(json!({ "success": true, "message": "Report sent" })).into_response(),
        Err(e) => {
            error!("On-demand report failed: {:#}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
        }
    }
}

/// Liveness and warm-up state
pub async fn health(State(state): State<AppState>) -> Response {
    let snapshot = state.cache.snapshot().await;
    Json(json!({
        "status": "ok",
        "timestamp": Local::now().to_rfc3339(),
        "total_servers": snapshot.len(),
        "warmed_up": snapshot.cycles_completed > 0,
        "telegram_enabled": state.telegram_enabled,
    }))
    .into_response()
}

/// Monitoring dashboard
pub async fn dashboard(State(state): State<AppState>) -> Html<String> {
    if let Some(path) = state.dashboard_path.as_deref() {
        match tokio::fs::read_to_string(path).await {
            Ok(html) => return Html(html),
            Err(e) => warn!("Cannot read dashboard {}: {}. Using built-in page", path, e),
        }
    }
    Html(BUILTIN_DASHBOARD.to_string())
}

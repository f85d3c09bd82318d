use axum::extract::State;
use axum::response::{Html, Json};
use serde::Serialize;

use crate::server::AppState;
use crate::telemetry::reading::Reading;

const DASHBOARD_HTML: &str = include_str!("dashboard.html");

/// GET /
pub async fn index() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

/// GET /api/data
pub async fn api_data(State(state): State<AppState>) -> Json<Reading> {
    Json(state.publisher.snapshot())
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub connected: bool,
    pub device_name: String,
}

/// GET /api/status
pub async fn api_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        connected: state.publisher.state().is_connected(),
        device_name: state.device_name.to_string(),
    })
}

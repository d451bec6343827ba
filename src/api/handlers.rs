use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::alerts::Runner;
use crate::checks::{Check, CheckId};
use crate::storage::{MemorySink, TelemetryRow};

/// Application state shared across handlers
pub struct AppState {
    pub runner: Arc<Runner>,
    /// Recent telemetry, when the daemon keeps it in memory
    pub telemetry: Option<Arc<MemorySink>>,
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub running: bool,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        running: state.runner.is_running(),
    })
}

// ============================================================================
// Checks
// ============================================================================

#[derive(Serialize)]
pub struct CheckInfo {
    pub id: u64,
    pub kind: &'static str,
    pub description: String,
    pub subject: Option<String>,
    pub ok: bool,
    pub reason: String,
    pub has_run: bool,
    pub last_checked: Option<i64>,
    pub min_failures: u32,
    pub failure_window_secs: i64,
}

impl From<&Check> for CheckInfo {
    fn from(check: &Check) -> Self {
        let status = check.status();
        let params = check.params();
        Self {
            id: check.id().as_u64(),
            kind: check.checker_name(),
            description: check.description(),
            subject: check.subject().map(str::to_string),
            ok: status.is_ok(),
            reason: status.reason().to_string(),
            has_run: check.has_run(),
            last_checked: check.last_checked(),
            min_failures: params.min_failures,
            failure_window_secs: params.failure_window_secs,
        }
    }
}

#[derive(Serialize)]
pub struct ChecksResponse {
    pub checks: Vec<CheckInfo>,
}

pub async fn list_checks(State(state): State<Arc<AppState>>) -> Json<ChecksResponse> {
    let checks = state
        .runner
        .checks()
        .iter()
        .map(|check| CheckInfo::from(check.as_ref()))
        .collect();

    Json(ChecksResponse { checks })
}

pub async fn get_check(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CheckId>,
) -> Result<Json<CheckInfo>, ApiError> {
    state
        .runner
        .check(id)
        .map(|check| Json(CheckInfo::from(check.as_ref())))
        .ok_or_else(|| ApiError::NotFound(format!("Check {} not found", id)))
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Serialize)]
pub struct AlertInfo {
    pub check_id: u64,
    pub kind: Option<&'static str>,
    pub label: Option<String>,
    pub reason: String,
}

#[derive(Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<AlertInfo>,
}

pub async fn list_alerts(State(state): State<Arc<AppState>>) -> Json<AlertsResponse> {
    let alerts = state
        .runner
        .active_alerts()
        .into_iter()
        .map(|key| {
            let check = state.runner.check(key.check);
            AlertInfo {
                check_id: key.check.as_u64(),
                kind: check.map(|c| c.checker_name()),
                label: check.map(|c| c.label()),
                reason: key.reason,
            }
        })
        .collect();

    Json(AlertsResponse { alerts })
}

// ============================================================================
// Telemetry
// ============================================================================

#[derive(Serialize)]
pub struct TelemetryResponse {
    pub checker: String,
    pub rows: Vec<TelemetryRow>,
}

pub async fn recent_telemetry(
    State(state): State<Arc<AppState>>,
    Path(checker): Path<String>,
) -> Result<Json<TelemetryResponse>, ApiError> {
    let sink = state
        .telemetry
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Telemetry is not kept in memory".to_string()))?;

    Ok(Json(TelemetryResponse {
        rows: sink.rows(&checker),
        checker,
    }))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

//! Sidecar health endpoints.
//!
//! `/readyz` answers 503 while draining or while a configured provisioner is
//! not taking jobs, and reports the module chain either way.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::app_state::AppState;

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn readyz(State(state): State<AppState>) -> Response {
    let expected = state.workers_expected();
    let running = state.workers_running();

    let reason = if state.is_draining() {
        Some("draining")
    } else if running < expected {
        Some("provisioner not running")
    } else {
        None
    };

    let body = json!({
        "ready": reason.is_none(),
        "reason": reason,
        "server_name": state.cfg().server_name,
        "modules": state.engine().module_names(),
        "provisioners": { "expected": expected, "running": running },
    });
    let status = if reason.is_none() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body)).into_response()
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    let body = state.metrics().render(&state.metrics_extra());
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
        .into_response()
}

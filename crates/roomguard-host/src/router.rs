//! Axum router wiring.
//!
//! Check endpoints for the homeserver plus operational endpoints.

use axum::{routing::{get, post}, Router};

use crate::{app_state::AppState, ops, transport};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/events/check", post(transport::http::check_event))
        .route("/v1/rooms/check_create", post(transport::http::check_create_room))
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .with_state(state)
}

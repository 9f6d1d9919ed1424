//! HTTP check endpoints.
//!
//! Responsibilities:
//! - Decode the body once (`codec`)
//! - Run the module chain
//! - Map refusals onto Matrix error bodies + status codes

use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use roomguard_core::error::{ClientCode, RoomGuardError};

use crate::app_state::AppState;
use crate::policy::PolicyDecision;
use crate::transport::codec::{decode_create_room, decode_event, error_body};

fn status_of(code: ClientCode) -> StatusCode {
    StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

fn reject(app: &AppState, hook: &str, code: ClientCode, msg: &str) -> Response {
    app.metrics().policy_decisions.inc(&[("hook", hook), ("decision", "reject")]);
    app.metrics().rejections.inc(&[("hook", hook), ("code", code.as_str())]);
    (status_of(code), Json(error_body(code.as_str(), msg))).into_response()
}

fn reject_err(app: &AppState, hook: &str, e: &RoomGuardError) -> Response {
    reject(app, hook, e.client_code(), &e.to_string())
}

/// `POST /v1/events/check`
pub async fn check_event(State(app): State<AppState>, body: Bytes) -> Response {
    let started = Instant::now();

    let resp = match decode_event(&body) {
        Err(e) => reject_err(&app, "event", &e),
        Ok(event) => {
            let decision = app.engine().check_event(&event);
            let label = decision.label();
            match decision {
                PolicyDecision::Pass => {
                    app.metrics().policy_decisions.inc(&[("hook", "event"), ("decision", label)]);
                    (StatusCode::OK, Json(json!({ "allowed": true }))).into_response()
                }
                PolicyDecision::Rewrite(ev) => {
                    app.metrics().policy_decisions.inc(&[("hook", "event"), ("decision", label)]);
                    (StatusCode::OK, Json(json!({ "allowed": true, "content": ev.content }))).into_response()
                }
                PolicyDecision::Reject { code, msg } => reject(&app, "event", code, &msg),
            }
        }
    };

    app.metrics().check_duration.observe(&[("hook", "event")], started.elapsed());
    resp
}

/// `POST /v1/rooms/check_create`
pub async fn check_create_room(State(app): State<AppState>, body: Bytes) -> Response {
    let started = Instant::now();

    let resp = match decode_create_room(&body).and_then(|req| {
        let before = req.clone();
        app.engine().check_create_room(req).map(|after| (before, after))
    }) {
        Ok((before, after)) => {
            let label = if before == after { "pass" } else { "rewrite" };
            app.metrics().policy_decisions.inc(&[("hook", "create_room"), ("decision", label)]);
            (StatusCode::OK, Json(after)).into_response()
        }
        Err(e) => reject_err(&app, "create_room", &e),
    };

    app.metrics().check_duration.observe(&[("hook", "create_room")], started.elapsed());
    resp
}

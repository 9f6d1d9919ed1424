//! Homeserver-backed room state against a local stand-in server.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use dashmap::DashMap;
use serde_json::{json, Value};

use roomguard_core::error::RoomGuardError;
use roomguard_host::config::{CallPermissionsConfig, HomeserverApiConfig};
use roomguard_host::policy::PolicyEngine;
use roomguard_host::services::provisioner::{provision_room, ProvisionJob, ProvisionOutcome};
use roomguard_host::state::{HomeserverClient, RoomStateApi};

const ROOM: &str = "!general:uatchatserver.lagroup.vn";
const ADMIN_TOKEN: &str = "admin-secret";
const AS_TOKEN: &str = "as-secret";

#[derive(Clone, Default)]
struct Homeserver {
    /// room_id -> current state events
    rooms: Arc<DashMap<String, Vec<Value>>>,
    /// (room_id, user_id, content) of every state PUT
    sent: Arc<DashMap<u64, (String, String, Value)>>,
    seq: Arc<AtomicU64>,
}

fn bearer_is(headers: &HeaderMap, token: &str) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {token}"))
        .unwrap_or(false)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "errcode": "M_UNKNOWN_TOKEN", "error": "bad token" })),
    )
        .into_response()
}

async fn room_state(
    State(hs): State<Homeserver>,
    Path(room_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !bearer_is(&headers, ADMIN_TOKEN) {
        return unauthorized();
    }
    match hs.rooms.get(&room_id) {
        Some(state) => Json(json!({ "state": state.value().clone() })).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "errcode": "M_NOT_FOUND", "error": "Room not found" })),
        )
            .into_response(),
    }
}

async fn put_state(
    State(hs): State<Homeserver>,
    Path((room_id, event_type)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(content): Json<Value>,
) -> Response {
    if !bearer_is(&headers, AS_TOKEN) {
        return unauthorized();
    }
    let Some(user_id) = query.get("user_id").cloned() else {
        return (StatusCode::FORBIDDEN, Json(json!({ "errcode": "M_FORBIDDEN" }))).into_response();
    };

    let n = hs.seq.fetch_add(1, Ordering::Relaxed) + 1;
    let event_id = format!("$sent-{n}");
    hs.sent.insert(n, (room_id.clone(), user_id.clone(), content.clone()));

    let mut state = hs.rooms.entry(room_id.clone()).or_insert_with(Vec::new);
    state.retain(|ev| !(ev["type"] == json!(event_type) && ev["state_key"] == json!("")));
    state.push(json!({
        "type": event_type,
        "state_key": "",
        "room_id": room_id,
        "sender": user_id,
        "event_id": event_id,
        "content": content,
    }));
    Json(json!({ "event_id": event_id })).into_response()
}

async fn serve(hs: Homeserver) -> SocketAddr {
    let app = Router::new()
        .route("/_synapse/admin/v1/rooms/:room_id/state", get(room_state))
        .route("/_matrix/client/v3/rooms/:room_id/state/:event_type/", put(put_state))
        .with_state(hs);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn client(addr: SocketAddr, admin_token: &str) -> HomeserverClient {
    HomeserverClient::connect(
        &format!("http://{addr}"),
        admin_token.into(),
        AS_TOKEN.into(),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn cfg() -> CallPermissionsConfig {
    CallPermissionsConfig {
        setup_delay_ms: 1,
        retry_base_ms: 1,
        max_setup_attempts: 2,
        ..CallPermissionsConfig::default()
    }
}

fn job() -> ProvisionJob {
    ProvisionJob {
        room_id: ROOM.into(),
        creator: "@creator:uatchatserver.lagroup.vn".into(),
    }
}

#[tokio::test]
async fn provisioning_patches_room_on_homeserver() {
    let hs = Homeserver::default();
    hs.rooms.insert(
        ROOM.into(),
        vec![
            json!({
                "type": "m.room.create", "state_key": "", "room_id": ROOM,
                "sender": "@creator:uatchatserver.lagroup.vn", "event_id": "$create",
                "content": { "room_version": "10" }
            }),
            json!({
                "type": "m.room.power_levels", "state_key": "", "room_id": ROOM,
                "sender": "@creator:uatchatserver.lagroup.vn", "event_id": "$pl",
                "content": {
                    "users": { "@creator:uatchatserver.lagroup.vn": 100, "@mod:uatchatserver.lagroup.vn": 50 },
                    "events": { "m.call.invite": 50 }
                }
            }),
        ],
    );
    let addr = serve(hs.clone()).await;
    let client = client(addr, ADMIN_TOKEN);

    let current = client
        .get_state_event(ROOM, "m.room.power_levels", "")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.event_id.as_deref(), Some("$pl"));

    let outcome = provision_room(&client, &PolicyEngine::default(), &cfg(), &job())
        .await
        .unwrap();
    let ProvisionOutcome::Applied { event_id, verified, .. } = outcome else {
        panic!("expected applied, got {outcome:?}");
    };
    assert_eq!(event_id, "$sent-1");
    assert!(verified);

    let (room, user, content) = hs.sent.get(&1).unwrap().value().clone();
    assert_eq!(room, ROOM);
    assert_eq!(user, "@creator:uatchatserver.lagroup.vn");
    assert_eq!(content["events"]["m.call.invite"], json!(0));
    assert_eq!(content["users"]["@mod:uatchatserver.lagroup.vn"], json!(50));
}

#[tokio::test]
async fn unknown_room_never_becomes_ready() {
    let addr = serve(Homeserver::default()).await;
    let client = client(addr, ADMIN_TOKEN);

    assert!(client.get_state_event(ROOM, "m.room.power_levels", "").await.unwrap().is_none());
    let outcome = provision_room(&client, &PolicyEngine::default(), &cfg(), &job())
        .await
        .unwrap();
    assert_eq!(outcome, ProvisionOutcome::NeverReady);
}

#[tokio::test]
async fn rejected_token_is_an_error() {
    let hs = Homeserver::default();
    hs.rooms.insert(ROOM.into(), Vec::new());
    let addr = serve(hs).await;
    let client = client(addr, "wrong");

    let err = client
        .get_state_event(ROOM, "m.room.power_levels", "")
        .await
        .unwrap_err();
    assert!(matches!(err, RoomGuardError::Internal(_)));
    assert!(err.to_string().contains("401"));
}

#[test]
fn missing_token_env_is_a_config_error() {
    let cfg = HomeserverApiConfig {
        base_url: "http://synapse:8008".into(),
        admin_token_env: "ROOMGUARD_TEST_UNSET_ADMIN_TOKEN".into(),
        as_token_env: "ROOMGUARD_TEST_UNSET_AS_TOKEN".into(),
        request_timeout_ms: 1000,
    };
    let err = HomeserverClient::from_config(&cfg).err().expect("must fail");
    assert!(matches!(err, RoomGuardError::BadConfig(_)));
}

//! Module chain behavior over room events and room creation requests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::sync::Arc;

use serde_json::{json, Value};

use roomguard_core::event::power_levels::MAX_POWER_LEVEL;
use roomguard_core::event::{
    CreateRoomRequest, StateEvent, CALL_EVENT_TYPES, CALL_INVITE, ROOM_ENCRYPTION,
    ROOM_POWER_LEVELS,
};
use roomguard_host::config::{self, RoomGuardSection};
use roomguard_host::dispatch::build_modules;
use roomguard_host::obs::metrics::HostMetrics;
use roomguard_host::policy::{PolicyDecision, PolicyEngine};
use roomguard_host::state::{RoomStateApi, RoomStateStore};

fn engine_from(modules_yaml: &str) -> PolicyEngine {
    let yaml = format!("server_name: \"uatchatserver.lagroup.vn\"\nmodules:\n{modules_yaml}");
    let cfg = config::load_from_str(&yaml).unwrap();
    let kinds = config::resolve_modules(&cfg).unwrap();
    let store: Arc<dyn RoomStateApi> = Arc::new(RoomStateStore::new());
    let limits = RoomGuardSection {
        provision_queue: 8,
        ..RoomGuardSection::default()
    };
    build_modules(kinds, Some(store), Arc::new(HostMetrics::default()), &limits)
        .unwrap()
        .engine
}

const CALL_MODULE: &str = r##"
  - module: call_permissions_module.CallPermissionsModule
    config:
      call_permission_level: 0
      excluded_room_prefixes: ["#admin:", "#system:", "#bot:"]
"##;

const E2EE_PATCH: &str = r#"
  - module: matrix_e2ee_filter.EncryptedRoomFilter
    config:
      patch_power_levels: true
"#;

const E2EE_REJECT: &str = r#"
  - module: matrix_e2ee_filter.EncryptedRoomFilter
    config:
      patch_power_levels: false
"#;

fn power_levels(room: &str, invite_level: i64) -> StateEvent {
    StateEvent::new(
        ROOM_POWER_LEVELS,
        room,
        "@creator:uatchatserver.lagroup.vn",
        json!({
            "users": { "@creator:uatchatserver.lagroup.vn": 100 },
            "events": { "m.call.invite": invite_level, "m.room.name": 50 },
            "events_default": 0,
            "state_default": 50
        }),
    )
}

fn content_after(engine: &PolicyEngine, ev: &StateEvent) -> Value {
    match engine.check_event(ev) {
        PolicyDecision::Pass => ev.content.clone(),
        PolicyDecision::Rewrite(out) => out.content,
        PolicyDecision::Reject { code, msg } => panic!("unexpected reject {code:?}: {msg}"),
    }
}

#[test]
fn excluded_admin_room_keeps_call_threshold() {
    let engine = engine_from(CALL_MODULE);
    let ev = power_levels("#admin:uatchatserver.lagroup.vn", 50);
    assert_eq!(engine.check_event(&ev), PolicyDecision::Pass);
}

#[test]
fn general_room_call_threshold_forced_to_level() {
    let engine = engine_from(CALL_MODULE);
    let ev = power_levels("#general:uatchatserver.lagroup.vn", 50);
    let content = content_after(&engine, &ev);

    assert_eq!(content["events"][CALL_INVITE], json!(0));
    for ty in CALL_EVENT_TYPES {
        assert_eq!(content["events"][ty], json!(0), "event type {ty}");
    }
    assert_eq!(content["events"]["m.room.name"], json!(50));
    assert_eq!(content["users"], ev.content["users"]);
}

#[test]
fn call_filter_is_idempotent() {
    let engine = engine_from(CALL_MODULE);
    let ev = power_levels("#general:uatchatserver.lagroup.vn", 50);
    let PolicyDecision::Rewrite(once) = engine.check_event(&ev) else {
        panic!("expected rewrite");
    };
    assert_eq!(engine.check_event(&once), PolicyDecision::Pass);
}

#[test]
fn non_power_level_events_pass_untouched() {
    let engine = engine_from(CALL_MODULE);
    let ev = StateEvent::new("m.room.name", "#general:uatchatserver.lagroup.vn", "@a:x", json!({ "name": "General" }));
    assert_eq!(engine.check_event(&ev), PolicyDecision::Pass);
}

#[test]
fn malformed_power_levels_are_rejected() {
    let engine = engine_from(CALL_MODULE);
    let ev = StateEvent::new(ROOM_POWER_LEVELS, "#general:x", "@a:x", json!("not an object"));
    match engine.check_event(&ev) {
        PolicyDecision::Reject { code, .. } => assert_eq!(code.as_str(), "M_BAD_JSON"),
        other => panic!("expected reject, got {other:?}"),
    }
}

#[test]
fn encryption_event_always_rejected() {
    for modules in [E2EE_PATCH, E2EE_REJECT] {
        let engine = engine_from(modules);
        let ev = StateEvent::new(
            ROOM_ENCRYPTION,
            "!room:uatchatserver.lagroup.vn",
            "@a:uatchatserver.lagroup.vn",
            json!({ "algorithm": "m.megolm.v1.aes-sha2" }),
        );
        match engine.check_event(&ev) {
            PolicyDecision::Reject { code, .. } => assert_eq!(code.as_str(), "M_FORBIDDEN"),
            other => panic!("expected reject, got {other:?}"),
        }
    }
}

#[test]
fn patched_power_levels_lock_encryption_out_of_reach() {
    let engine = engine_from(E2EE_PATCH);
    let mut ev = power_levels("!room:x", 50);
    ev.content["users"]["@owner:x"] = json!(150);

    let content = content_after(&engine, &ev);
    let lock = content["events"][ROOM_ENCRYPTION].as_i64().unwrap();
    assert_eq!(lock, 151);

    let users = content["users"].as_object().unwrap();
    assert!(users.values().all(|l| l.as_i64().unwrap() < lock));

    // second pass changes nothing
    let again = StateEvent { content: content.clone(), ..ev.clone() };
    assert_eq!(engine.check_event(&again), PolicyDecision::Pass);
}

#[test]
fn create_room_with_encryption_rejected_without_patch() {
    let engine = engine_from(E2EE_REJECT);
    let req: CreateRoomRequest = serde_json::from_value(json!({
        "preset": "private_chat",
        "initial_state": [{ "type": "m.room.encryption", "state_key": "", "content": { "algorithm": "m.megolm.v1.aes-sha2" } }]
    }))
    .unwrap();

    let err = engine.check_create_room(req).expect_err("must reject");
    assert_eq!(err.client_code().as_str(), "M_FORBIDDEN");
}

#[test]
fn create_room_with_encryption_stripped_with_patch() {
    let engine = engine_from(E2EE_PATCH);
    let req: CreateRoomRequest = serde_json::from_value(json!({
        "preset": "private_chat",
        "initial_state": [
            { "type": "m.room.encryption", "state_key": "", "content": { "algorithm": "m.megolm.v1.aes-sha2" } },
            { "type": "m.room.history_visibility", "state_key": "", "content": { "history_visibility": "joined" } }
        ]
    }))
    .unwrap();

    let out = engine.check_create_room(req).unwrap();
    assert!(!out.has_initial_state(ROOM_ENCRYPTION));
    assert_eq!(out.initial_state.len(), 1);

    let lock = out.power_level_content_override.as_ref().unwrap()["events"][ROOM_ENCRYPTION]
        .as_i64()
        .unwrap();
    assert!(lock > 100);
    assert!(lock <= MAX_POWER_LEVEL);

    // idempotent
    let again = engine.check_create_room(out.clone()).unwrap();
    assert_eq!(again, out);
}

#[test]
fn create_room_without_encryption_passes_reject_mode() {
    let engine = engine_from(E2EE_REJECT);
    let req = CreateRoomRequest {
        preset: Some("public_chat".into()),
        ..CreateRoomRequest::default()
    };
    assert_eq!(engine.check_create_room(req.clone()).unwrap(), req);
}

#[test]
fn chain_applies_both_modules_in_order() {
    let engine = engine_from(&format!("{E2EE_PATCH}{CALL_MODULE}"));
    assert_eq!(
        engine.module_names(),
        vec![
            "matrix_e2ee_filter.EncryptedRoomFilter",
            "call_permissions_module.CallPermissionsModule"
        ]
    );

    let ev = power_levels("#general:uatchatserver.lagroup.vn", 50);
    let content = content_after(&engine, &ev);
    assert_eq!(content["events"][CALL_INVITE], json!(0));
    assert_eq!(content["events"][ROOM_ENCRYPTION], json!(101));

    let again = StateEvent { content, ..ev };
    assert_eq!(engine.check_event(&again), PolicyDecision::Pass);
}

#[test]
fn excluded_room_still_gets_encryption_lock() {
    let engine = engine_from(&format!("{E2EE_PATCH}{CALL_MODULE}"));
    let ev = power_levels("#admin:uatchatserver.lagroup.vn", 50);
    let content = content_after(&engine, &ev);
    assert_eq!(content["events"][CALL_INVITE], json!(50));
    assert_eq!(content["events"][ROOM_ENCRYPTION], json!(101));
}

#[test]
fn auto_provisioning_without_homeserver_is_a_config_error() {
    let yaml = format!("server_name: \"uatchatserver.lagroup.vn\"\nmodules:\n{CALL_MODULE}");
    let cfg = config::load_from_str(&yaml).unwrap();
    let kinds = config::resolve_modules(&cfg).unwrap();
    let err = build_modules(kinds, None, Arc::new(HostMetrics::default()), &RoomGuardSection::default())
        .err()
        .expect("must fail");
    assert!(err.to_string().contains("roomguard.homeserver"));
}

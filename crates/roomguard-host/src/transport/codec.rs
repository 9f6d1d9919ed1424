//! Decode-once codec for the check endpoints.
//!
//! - Request bodies => `StateEvent` / `CreateRoomRequest`
//! - Errors => Matrix-style `{"errcode", "error"}` bodies
//!
//! Undecodable bodies are `MalformedEvent`, so the host fails closed.

use serde_json::{json, Value};

use roomguard_core::error::{Result, RoomGuardError};
use roomguard_core::event::{CreateRoomRequest, StateEvent};

pub fn decode_event(body: &[u8]) -> Result<StateEvent> {
    serde_json::from_slice(body)
        .map_err(|e| RoomGuardError::MalformedEvent(format!("invalid event json: {e}")))
}

pub fn decode_create_room(body: &[u8]) -> Result<CreateRoomRequest> {
    serde_json::from_slice(body)
        .map_err(|e| RoomGuardError::MalformedEvent(format!("invalid createRoom json: {e}")))
}

pub fn error_body(code: &str, msg: &str) -> Value {
    json!({
        "errcode": code,
        "error": msg
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_room_id_is_malformed() {
        let err = decode_event(br#"{"type":"m.room.power_levels","sender":"@a:x","content":{}}"#)
            .unwrap_err();
        assert_eq!(err.client_code().as_str(), "M_BAD_JSON");
    }

    #[test]
    fn create_room_accepts_empty_object() {
        let req = decode_create_room(b"{}").unwrap();
        assert!(req.initial_state.is_empty());
    }
}

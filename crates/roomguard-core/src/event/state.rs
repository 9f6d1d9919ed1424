use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, RoomGuardError};

/// A room event as handed over by the host.
///
/// Keys other than the ones below (`origin_server_ts`, `unsigned`, ...) are
/// kept in `extra` so a rewritten event serializes back with them intact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEvent {
    /// Event type (field name is `type` in JSON).
    #[serde(rename = "type")]
    pub event_type: String,
    pub room_id: String,
    pub sender: String,
    /// `None` for non-state (timeline) events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_key: Option<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StateEvent {
    /// Build a state event with an empty state key.
    pub fn new(
        event_type: impl Into<String>,
        room_id: impl Into<String>,
        sender: impl Into<String>,
        content: Value,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            room_id: room_id.into(),
            sender: sender.into(),
            state_key: Some(String::new()),
            content,
            event_id: None,
            extra: Map::new(),
        }
    }

    pub fn is_state(&self) -> bool {
        self.state_key.is_some()
    }

    /// True for a state event of type `ty` (any state key).
    pub fn is_state_of(&self, ty: &str) -> bool {
        self.is_state() && self.event_type == ty
    }

    /// Content as a JSON object, or `MalformedEvent`.
    pub fn content_object(&self) -> Result<&Map<String, Value>> {
        self.content.as_object().ok_or_else(|| {
            RoomGuardError::MalformedEvent(format!(
                "{} content must be an object (room={})",
                self.event_type, self.room_id
            ))
        })
    }

    pub fn content_object_mut(&mut self) -> Result<&mut Map<String, Value>> {
        let (ty, room) = (self.event_type.clone(), self.room_id.clone());
        self.content.as_object_mut().ok_or_else(|| {
            RoomGuardError::MalformedEvent(format!(
                "{ty} content must be an object (room={room})"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    #[test]
    fn keeps_unknown_keys() {
        let raw = json!({
            "type": "m.room.power_levels",
            "room_id": "!abc:example.org",
            "sender": "@alice:example.org",
            "state_key": "",
            "content": { "ban": 50 },
            "origin_server_ts": 1700000000000u64,
            "unsigned": { "age": 12 }
        });
        let ev: StateEvent = serde_json::from_value(raw.clone()).unwrap();
        assert!(ev.is_state_of("m.room.power_levels"));
        assert_eq!(serde_json::to_value(&ev).unwrap(), raw);
    }

    #[test]
    fn timeline_event_is_not_state() {
        let ev: StateEvent = serde_json::from_value(json!({
            "type": "m.room.message",
            "room_id": "!abc:example.org",
            "sender": "@alice:example.org",
            "content": { "body": "hi" }
        }))
        .unwrap();
        assert!(!ev.is_state());
    }

    #[test]
    fn non_object_content_is_malformed() {
        let ev = StateEvent::new("m.room.power_levels", "!a:b", "@c:b", json!([1, 2]));
        let err = ev.content_object().unwrap_err();
        assert_eq!(err.client_code().as_str(), "M_BAD_JSON");
    }
}

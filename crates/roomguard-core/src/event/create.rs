use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of a room creation request, as seen by `on_create_room` hooks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_alias_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub initial_state: Vec<InitialStateEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_level_content_override: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_content: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of `initial_state`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialStateEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub state_key: String,
    #[serde(default)]
    pub content: Value,
}

impl CreateRoomRequest {
    pub fn has_initial_state(&self, ty: &str) -> bool {
        self.initial_state.iter().any(|e| e.event_type == ty)
    }

    /// Drop every initial state entry of type `ty`, returning how many went.
    pub fn remove_initial_state(&mut self, ty: &str) -> usize {
        let before = self.initial_state.len();
        self.initial_state.retain(|e| e.event_type != ty);
        before - self.initial_state.len()
    }

    /// Power-level override object, created empty if absent.
    pub fn power_level_override_mut(&mut self) -> &mut Map<String, Value> {
        self.power_level_content_override.get_or_insert_with(Map::new)
    }

    /// Room type from `creation_content.type` (e.g. `m.space`).
    pub fn room_type(&self) -> Option<&str> {
        self.creation_content
            .as_ref()
            .and_then(|c| c.get("type"))
            .and_then(Value::as_str)
    }
}

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use roomguard_core::error::{Result, RoomGuardError};
use roomguard_core::event::StateEvent;

/// Host-provided room state access.
#[async_trait]
pub trait RoomStateApi: Send + Sync {
    /// Current state event for `(event_type, state_key)` in a room.
    async fn get_state_event(
        &self,
        room_id: &str,
        event_type: &str,
        state_key: &str,
    ) -> Result<Option<StateEvent>>;

    /// Send a state event into a room. Returns the event id.
    async fn send_state_event(&self, event: StateEvent) -> Result<String>;
}

type StateKey = (String, String);

/// In-memory room state:
/// - `room_id -> (event_type, state_key) -> latest event`
#[derive(Default)]
pub struct RoomStateStore {
    rooms: DashMap<String, DashMap<StateKey, StateEvent>>,
    seq: AtomicU64,
}

impl RoomStateStore {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            seq: AtomicU64::new(1),
        }
    }

    /// Store a state event as the room's current value for its key.
    /// Timeline events are ignored.
    pub fn record(&self, event: StateEvent) {
        let Some(state_key) = event.state_key.clone() else {
            return;
        };
        self.rooms
            .entry(event.room_id.clone())
            .or_insert_with(DashMap::new)
            .insert((event.event_type.clone(), state_key), event);
    }

    pub fn get(&self, room_id: &str, event_type: &str, state_key: &str) -> Option<StateEvent> {
        let room = self.rooms.get(room_id)?;
        let ev = room
            .get(&(event_type.to_string(), state_key.to_string()))
            .map(|r| r.value().clone());
        ev
    }

    fn next_event_id(&self) -> String {
        let n = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("$roomguard-{n}")
    }
}

#[async_trait]
impl RoomStateApi for RoomStateStore {
    async fn get_state_event(
        &self,
        room_id: &str,
        event_type: &str,
        state_key: &str,
    ) -> Result<Option<StateEvent>> {
        Ok(self.get(room_id, event_type, state_key))
    }

    async fn send_state_event(&self, mut event: StateEvent) -> Result<String> {
        if event.state_key.is_none() {
            return Err(RoomGuardError::BadRequest(format!(
                "{} sent without state_key",
                event.event_type
            )));
        }
        let event_id = event.event_id.clone().unwrap_or_else(|| self.next_event_id());
        event.event_id = Some(event_id.clone());
        self.record(event);
        Ok(event_id)
    }
}

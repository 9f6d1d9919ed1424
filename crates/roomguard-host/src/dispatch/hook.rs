use serde_json::Value;

use roomguard_core::error::Result;
use roomguard_core::event::{CreateRoomRequest, StateEvent};

/// What a module wants done with an event it allowed.
#[derive(Debug, Clone, PartialEq)]
pub enum HookOutcome {
    Pass,
    /// Replace the event content.
    Rewrite(Value),
}

/// Policy hook invoked by the host on the event path.
///
/// Hooks are called synchronously and must return promptly: no I/O, no
/// blocking, no state beyond the config they were built with. An `Err`
/// refuses the event or request.
pub trait EventPolicyHook: Send + Sync {
    fn name(&self) -> &'static str;

    /// Inspect or rewrite a room creation request before the room exists.
    fn on_create_room(&self, _req: &mut CreateRoomRequest) -> Result<()> {
        Ok(())
    }

    /// Decide on an event before the host persists it.
    fn check_event_allowed(&self, event: &StateEvent) -> Result<HookOutcome>;
}

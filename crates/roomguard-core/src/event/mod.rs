//! Room event model (state events, room creation requests, power levels).
//!
//! Events are kept as loosely-typed JSON so that filters can rewrite the
//! fields they own and hand every other key back to the host untouched.
//! Accessors that a filter relies on return `MalformedEvent` instead of
//! guessing, which lets callers fail closed.

pub mod create;
pub mod power_levels;
pub mod state;

pub use create::{CreateRoomRequest, InitialStateEvent};
pub use power_levels::{PowerLevels, PowerLevelsMut};
pub use state::StateEvent;

/// `m.room.create`
pub const ROOM_CREATE: &str = "m.room.create";
/// `m.room.encryption`
pub const ROOM_ENCRYPTION: &str = "m.room.encryption";
/// `m.room.power_levels`
pub const ROOM_POWER_LEVELS: &str = "m.room.power_levels";

/// Event types whose send threshold is governed by the call permission level.
pub const CALL_EVENT_TYPES: [&str; 11] = [
    // 1:1 calls
    "m.call.invite",
    "m.call.answer",
    "m.call.hangup",
    "m.call.candidates",
    "m.call.select_answer",
    "m.call.reject",
    "m.call.negotiate",
    // group calls
    "org.matrix.msc3401.call",
    "org.matrix.msc3401.call.member",
    "m.call.member",
    // widgets
    "im.vector.modular.widgets",
];

/// Event type whose level is the call-initiation threshold.
pub const CALL_INVITE: &str = "m.call.invite";

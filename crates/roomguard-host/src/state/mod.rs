//! Room state access for modules.
//!
//! `RoomStateApi` is the part of the host contract that lets a module read
//! current room state and send state events of its own.
//! - `HomeserverClient` talks to the homeserver over HTTP
//! - `RoomStateStore` keeps state in memory (tests, local runs)

mod homeserver;
mod room_state;

pub use homeserver::HomeserverClient;
pub use room_state::{RoomStateApi, RoomStateStore};

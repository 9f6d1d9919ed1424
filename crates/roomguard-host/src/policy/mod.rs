//! Policy layer (room filters and the ordered module chain).
//!
//! Filters are pure functions of (event, static config). The engine runs
//! them in config order for the transport layer to consume at runtime.

pub mod call_permissions;
pub mod encryption;
pub mod engine;
pub mod prefixes;

pub use call_permissions::CallPermissionFilter;
pub use encryption::EncryptedRoomFilter;
pub use engine::{PolicyDecision, PolicyEngine};

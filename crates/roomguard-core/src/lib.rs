//! roomguard core: event model, power-levels helpers, and the shared error type.
//!
//! This crate defines the room-event contracts and error surface shared by the
//! policy modules, the host runtime, and tests. It carries no runtime or HTTP
//! dependencies so filters built on it stay pure functions of
//! (event, static config).
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed events surface as `RoomGuardError::MalformedEvent` so hooks can
//! fail closed instead of crashing the host.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod event;

/// Shared result type.
pub use error::{Result, RoomGuardError};

//! Transport layer (HTTP).
//!
//! Exposes the check handlers and the codec that decodes bodies once before
//! they reach the policy engine.

pub mod codec;
pub mod http;

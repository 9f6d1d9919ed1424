//! roomguard host library entry.
//!
//! This crate wires config loading, the room policy modules, the module
//! chain, the call-permission provisioner and the HTTP sidecar into one
//! stack. It is consumed by the binary (`main.rs`) and by integration tests.

pub mod app_state;
pub mod config;
pub mod dispatch;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod router;
pub mod services;
pub mod state;
pub mod transport;

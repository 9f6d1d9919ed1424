//! Module hook contract and registry.
//!
//! Re-exports the hook trait and the registry builder so downstream consumers
//! can depend on this module directly.

pub mod hook;
pub mod registry;

pub use hook::{EventPolicyHook, HookOutcome};
pub use registry::{build_modules, BuiltModules};

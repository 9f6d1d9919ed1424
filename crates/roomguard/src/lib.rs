//! Top-level facade crate for roomguard.
//!
//! Re-exports the event model and the policy host so users can depend on a single crate.

pub mod core {
    pub use roomguard_core::*;
}

pub mod host {
    pub use roomguard_host::*;
}

//! Excluded room-prefix compilation and matching.
//!
//! Membership test only: order in the config does not matter, the first
//! matching prefix is reported for logging.

use roomguard_core::error::{Result, RoomGuardError};

/// Compiled set of room identifier prefixes.
#[derive(Debug, Clone, Default)]
pub struct PrefixSet {
    prefixes: Vec<String>,
}

impl PrefixSet {
    pub fn compile(raw: &[String]) -> Result<Self> {
        let mut out = Vec::with_capacity(raw.len());
        for p in raw {
            if p.is_empty() {
                return Err(RoomGuardError::MisconfiguredModule(
                    "empty room prefix".into(),
                ));
            }
            if !out.contains(p) {
                out.push(p.clone());
            }
        }
        Ok(Self { prefixes: out })
    }

    /// Prefix that exempts `room_id`, if any.
    pub fn matching(&self, room_id: &str) -> Option<&str> {
        self.prefixes
            .iter()
            .find(|p| room_id.starts_with(p.as_str()))
            .map(String::as_str)
    }
}

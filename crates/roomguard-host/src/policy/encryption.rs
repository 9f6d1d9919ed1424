//! Encrypted-room filter (`matrix_e2ee_filter.EncryptedRoomFilter`).
//!
//! Keeps end-to-end encryption disabled: encryption state events are always
//! refused, and with `patch_power_levels` every power-levels document (and
//! every room creation request) gets an encryption threshold no member can
//! reach.

use serde_json::{Map, Value};

use roomguard_core::error::{Result, RoomGuardError};
use roomguard_core::event::power_levels::MAX_POWER_LEVEL;
use roomguard_core::event::{
    CreateRoomRequest, PowerLevels, PowerLevelsMut, StateEvent, ROOM_ENCRYPTION,
    ROOM_POWER_LEVELS,
};

use crate::config::EncryptedRoomFilterConfig;
use crate::dispatch::{EventPolicyHook, HookOutcome};

pub struct EncryptedRoomFilter {
    cfg: EncryptedRoomFilterConfig,
}

impl EncryptedRoomFilter {
    pub fn new(cfg: EncryptedRoomFilterConfig) -> Self {
        Self { cfg }
    }
}

/// One above the highest level any member can hold, capped at the canonical max.
pub fn unreachable_level(pl: &PowerLevels<'_>) -> Result<i64> {
    Ok(pl.highest_user_level()?.saturating_add(1).min(MAX_POWER_LEVEL))
}

/// Raise the `m.room.encryption` threshold out of reach. Returns whether the
/// content changed. A threshold that is already high enough is left as is.
pub fn lock_encryption(content: &mut Map<String, Value>) -> Result<bool> {
    let view = PowerLevels::new(content);
    view.validate()?;
    let target = unreachable_level(&view)?;
    if matches!(view.event_level(ROOM_ENCRYPTION)?, Some(l) if l >= target) {
        return Ok(false);
    }
    PowerLevelsMut::new(content).set_event_level(ROOM_ENCRYPTION, target)
}

impl EventPolicyHook for EncryptedRoomFilter {
    fn name(&self) -> &'static str {
        crate::config::modules::ENCRYPTED_ROOM_FILTER
    }

    fn on_create_room(&self, req: &mut CreateRoomRequest) -> Result<()> {
        if req.has_initial_state(ROOM_ENCRYPTION) {
            if !self.cfg.patch_power_levels {
                return Err(RoomGuardError::PolicyViolation(
                    "encrypted rooms are not allowed on this server".into(),
                ));
            }
            let n = req.remove_initial_state(ROOM_ENCRYPTION);
            tracing::info!(stripped = n, "removed m.room.encryption from initial_state");
        }

        if self.cfg.patch_power_levels {
            lock_encryption(req.power_level_override_mut())?;
        }
        Ok(())
    }

    fn check_event_allowed(&self, event: &StateEvent) -> Result<HookOutcome> {
        if event.is_state_of(ROOM_ENCRYPTION) {
            tracing::info!(room = %event.room_id, sender = %event.sender, "refusing m.room.encryption");
            return Err(RoomGuardError::PolicyViolation(
                "enabling encryption is not allowed on this server".into(),
            ));
        }

        if self.cfg.patch_power_levels && event.is_state_of(ROOM_POWER_LEVELS) {
            let mut content = event.content_object()?.clone();
            if lock_encryption(&mut content)? {
                tracing::debug!(room = %event.room_id, "locked encryption threshold");
                return Ok(HookOutcome::Rewrite(Value::Object(content)));
            }
        }

        Ok(HookOutcome::Pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter(patch: bool) -> EncryptedRoomFilter {
        EncryptedRoomFilter::new(EncryptedRoomFilterConfig { patch_power_levels: patch })
    }

    #[test]
    fn unreachable_is_above_every_member() {
        let c = json!({ "users": { "@a:x": 100, "@b:x": 120 }, "users_default": 5 });
        let pl = PowerLevels::new(c.as_object().unwrap());
        assert_eq!(unreachable_level(&pl).unwrap(), 121);
    }

    #[test]
    fn cap_at_canonical_max() {
        let c = json!({ "users": { "@root:x": MAX_POWER_LEVEL } });
        let pl = PowerLevels::new(c.as_object().unwrap());
        assert_eq!(unreachable_level(&pl).unwrap(), MAX_POWER_LEVEL);
    }

    #[test]
    fn power_levels_untouched_without_patch() {
        let ev = StateEvent::new(ROOM_POWER_LEVELS, "!r:x", "@a:x", json!({ "users": { "@a:x": 100 } }));
        assert_eq!(filter(false).check_event_allowed(&ev).unwrap(), HookOutcome::Pass);
    }

    #[test]
    fn higher_existing_threshold_is_kept() {
        let mut c = json!({ "events": { "m.room.encryption": 9000 } });
        let changed = lock_encryption(c.as_object_mut().unwrap()).unwrap();
        assert!(!changed);
        assert_eq!(c["events"]["m.room.encryption"], json!(9000));
    }

    #[test]
    fn timeline_event_named_like_encryption_passes() {
        let mut ev = StateEvent::new(ROOM_ENCRYPTION, "!r:x", "@a:x", json!({}));
        ev.state_key = None;
        assert_eq!(filter(false).check_event_allowed(&ev).unwrap(), HookOutcome::Pass);
    }
}

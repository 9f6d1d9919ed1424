//! Call-permission filter (`call_permissions_module.CallPermissionsModule`).
//!
//! Forces the send threshold of every call event type to
//! `call_permission_level` on each power-levels event, except in rooms whose
//! identifier starts with an excluded prefix. Newly created rooms are also
//! handed to the provisioner, which patches their first power-levels event.

use std::sync::Arc;

use serde_json::{Map, Value};

use roomguard_core::error::Result;
use roomguard_core::event::{
    PowerLevels, PowerLevelsMut, StateEvent, CALL_EVENT_TYPES, ROOM_CREATE, ROOM_POWER_LEVELS,
};

use crate::config::CallPermissionsConfig;
use crate::dispatch::{EventPolicyHook, HookOutcome};
use crate::services::provisioner::{ProvisionJob, ProvisionQueue};

use super::prefixes::PrefixSet;

/// One field rewritten by [`apply_call_levels`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelChange {
    pub field: String,
    pub old: Option<i64>,
    pub new: i64,
}

impl std::fmt::Display for LevelChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.old {
            Some(old) => write!(f, "{}: {} -> {}", self.field, old, self.new),
            None => write!(f, "{}: not set -> {}", self.field, self.new),
        }
    }
}

/// Set every call event type to the configured level and, when enabled,
/// lower `events_default` to it. Returns the changes made, empty when the
/// content was already correct.
pub fn apply_call_levels(
    cfg: &CallPermissionsConfig,
    content: &mut Map<String, Value>,
) -> Result<Vec<LevelChange>> {
    PowerLevels::new(content).validate()?;

    let level = cfg.call_permission_level;
    let mut pl = PowerLevelsMut::new(content);
    let mut changes = Vec::new();

    for ty in CALL_EVENT_TYPES {
        let old = pl.view().event_level(ty)?;
        if pl.set_event_level(ty, level)? && old != Some(level) {
            changes.push(LevelChange {
                field: format!("events.{ty}"),
                old,
                new: level,
            });
        }
    }

    if cfg.also_set_events_default {
        if let Some(old) = pl.lower_events_default(level)? {
            changes.push(LevelChange {
                field: "events_default".into(),
                old: Some(old),
                new: level,
            });
        }
    }

    Ok(changes)
}

pub struct CallPermissionFilter {
    cfg: Arc<CallPermissionsConfig>,
    excluded: PrefixSet,
    queue: Option<ProvisionQueue>,
}

impl CallPermissionFilter {
    pub fn new(cfg: Arc<CallPermissionsConfig>, queue: Option<ProvisionQueue>) -> Result<Self> {
        let excluded = PrefixSet::compile(&cfg.excluded_room_prefixes)?;
        Ok(Self { cfg, excluded, queue })
    }

    fn is_excluded(&self, room_id: &str) -> bool {
        match self.excluded.matching(room_id) {
            Some(prefix) => {
                tracing::debug!(room = %room_id, prefix, "room excluded from call permissions");
                true
            }
            None => false,
        }
    }

    fn on_room_created(&self, event: &StateEvent) {
        let Some(queue) = &self.queue else { return };
        if self.is_excluded(&event.room_id) {
            return;
        }
        if let Some(room_type) = event.content.get("type").and_then(Value::as_str) {
            if self.cfg.excluded_room_types.iter().any(|t| t == room_type) {
                tracing::info!(room = %event.room_id, room_type, "excluding room type");
                return;
            }
        }

        tracing::info!(room = %event.room_id, creator = %event.sender, "new room queued for call permissions");
        queue.enqueue(ProvisionJob {
            room_id: event.room_id.clone(),
            creator: event.sender.clone(),
        });
    }
}

impl EventPolicyHook for CallPermissionFilter {
    fn name(&self) -> &'static str {
        crate::config::modules::CALL_PERMISSIONS_MODULE
    }

    fn check_event_allowed(&self, event: &StateEvent) -> Result<HookOutcome> {
        if !self.cfg.enable_auto_call_permissions {
            return Ok(HookOutcome::Pass);
        }

        if event.is_state_of(ROOM_CREATE) {
            self.on_room_created(event);
            return Ok(HookOutcome::Pass);
        }

        if !event.is_state_of(ROOM_POWER_LEVELS) || self.is_excluded(&event.room_id) {
            return Ok(HookOutcome::Pass);
        }

        let mut content = event.content_object()?.clone();
        let changes = apply_call_levels(&self.cfg, &mut content)?;
        if changes.is_empty() {
            return Ok(HookOutcome::Pass);
        }

        tracing::info!(room = %event.room_id, changes = changes.len(), "forcing call permission level");
        Ok(HookOutcome::Rewrite(Value::Object(content)))
    }
}

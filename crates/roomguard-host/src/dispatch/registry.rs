use std::sync::Arc;

use roomguard_core::error::{Result, RoomGuardError};

use crate::config::{ModuleKind, RoomGuardSection};
use crate::obs::metrics::HostMetrics;
use crate::policy::{CallPermissionFilter, EncryptedRoomFilter, PolicyEngine};
use crate::services::provisioner::{self, Provisioner};
use crate::state::RoomStateApi;

use super::EventPolicyHook;

/// Modules built from config: the chain plus background workers to spawn.
pub struct BuiltModules {
    pub engine: PolicyEngine,
    pub provisioners: Vec<Provisioner>,
}

/// Instantiate each configured module, keeping config order.
///
/// `api` is where provisioners read and write room state; it is required
/// once any call module has automatic provisioning enabled.
pub fn build_modules(
    kinds: Vec<ModuleKind>,
    api: Option<Arc<dyn RoomStateApi>>,
    metrics: Arc<HostMetrics>,
    limits: &RoomGuardSection,
) -> Result<BuiltModules> {
    let mut hooks: Vec<Arc<dyn EventPolicyHook>> = Vec::with_capacity(kinds.len());
    let mut provisioners = Vec::new();

    for kind in kinds {
        let name = kind.name();
        match kind {
            ModuleKind::EncryptedRoomFilter(cfg) => {
                tracing::info!(module = name, patch_power_levels = cfg.patch_power_levels, "module loaded");
                hooks.push(Arc::new(EncryptedRoomFilter::new(cfg)));
            }
            ModuleKind::CallPermissions(cfg) => {
                tracing::info!(
                    module = name,
                    level = cfg.call_permission_level,
                    set_events_default = cfg.also_set_events_default,
                    excluded = ?cfg.excluded_room_prefixes,
                    "module loaded"
                );
                let cfg = Arc::new(cfg);
                let queue = if cfg.enable_auto_call_permissions {
                    let api = api.as_ref().ok_or_else(|| {
                        RoomGuardError::BadConfig(format!(
                            "{name} provisions rooms and needs roomguard.homeserver"
                        ))
                    })?;
                    let (queue, worker) = provisioner::channel(
                        Arc::clone(&cfg),
                        Arc::clone(api),
                        Arc::clone(&metrics),
                        limits.provision_queue,
                        limits.provision_concurrency,
                    );
                    provisioners.push(worker);
                    Some(queue)
                } else {
                    None
                };
                hooks.push(Arc::new(CallPermissionFilter::new(cfg, queue)?));
            }
        }
    }

    Ok(BuiltModules {
        engine: PolicyEngine::new(hooks),
        provisioners,
    })
}

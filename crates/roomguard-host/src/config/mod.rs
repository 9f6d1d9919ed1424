//! Homeserver config loader (strict where the schema is ours).

pub mod modules;
pub mod schema;

use std::fs;

use roomguard_core::error::{Result, RoomGuardError};

pub use modules::{CallPermissionsConfig, EncryptedRoomFilterConfig, ModuleKind};
pub use schema::{HomeserverApiConfig, HomeserverConfig, ModuleEntry, RoomGuardSection};

pub fn load_from_file(path: &str) -> Result<HomeserverConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| RoomGuardError::BadConfig(format!("read config failed ({path}): {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<HomeserverConfig> {
    let cfg: HomeserverConfig = serde_yaml::from_str(s)
        .map_err(|e| RoomGuardError::BadConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Resolve every `modules:` entry, in config order.
pub fn resolve_modules(cfg: &HomeserverConfig) -> Result<Vec<ModuleKind>> {
    cfg.modules.iter().map(ModuleKind::from_entry).collect()
}

//! Typed module configs, resolved from `modules[].config` mappings.
//!
//! Parsing is strict: unknown keys, wrong types and out-of-range values are
//! `MisconfiguredModule`, which aborts startup.

use serde::Deserialize;

use roomguard_core::error::{Result, RoomGuardError};
use roomguard_core::event::power_levels::{MAX_POWER_LEVEL, MIN_POWER_LEVEL};

use super::schema::ModuleEntry;

/// Module name for the encrypted-room filter.
pub const ENCRYPTED_ROOM_FILTER: &str = "matrix_e2ee_filter.EncryptedRoomFilter";
/// Module name for the call-permission filter.
pub const CALL_PERMISSIONS_MODULE: &str = "call_permissions_module.CallPermissionsModule";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EncryptedRoomFilterConfig {
    /// Rewrite power levels so nobody can enable encryption, instead of only
    /// rejecting encryption events.
    #[serde(default)]
    pub patch_power_levels: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallPermissionsConfig {
    #[serde(default = "default_true")]
    pub enable_auto_call_permissions: bool,

    #[serde(default)]
    pub call_permission_level: i64,

    #[serde(default = "default_true")]
    pub also_set_events_default: bool,

    /// Rooms whose identifier starts with one of these are left alone.
    #[serde(default)]
    pub excluded_room_prefixes: Vec<String>,

    /// `m.room.create` content types that are never provisioned.
    #[serde(default = "default_excluded_room_types")]
    pub excluded_room_types: Vec<String>,

    #[serde(default = "default_setup_delay_ms")]
    pub setup_delay_ms: u64,

    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    #[serde(default = "default_max_setup_attempts")]
    pub max_setup_attempts: u32,
}

impl Default for CallPermissionsConfig {
    fn default() -> Self {
        Self {
            enable_auto_call_permissions: true,
            call_permission_level: 0,
            also_set_events_default: true,
            excluded_room_prefixes: Vec::new(),
            excluded_room_types: default_excluded_room_types(),
            setup_delay_ms: default_setup_delay_ms(),
            retry_base_ms: default_retry_base_ms(),
            max_setup_attempts: default_max_setup_attempts(),
        }
    }
}

impl CallPermissionsConfig {
    pub fn validate(&self) -> Result<()> {
        if !(MIN_POWER_LEVEL..=MAX_POWER_LEVEL).contains(&self.call_permission_level) {
            return Err(RoomGuardError::MisconfiguredModule(
                "call_permission_level out of canonical integer range".into(),
            ));
        }
        if self.excluded_room_prefixes.iter().any(|p| p.is_empty()) {
            return Err(RoomGuardError::MisconfiguredModule(
                "excluded_room_prefixes must not contain empty strings".into(),
            ));
        }
        if !(1..=10).contains(&self.max_setup_attempts) {
            return Err(RoomGuardError::MisconfiguredModule(
                "max_setup_attempts must be between 1 and 10".into(),
            ));
        }
        if self.retry_base_ms == 0 {
            return Err(RoomGuardError::MisconfiguredModule(
                "retry_base_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}
fn default_excluded_room_types() -> Vec<String> {
    vec!["m.space".into()]
}
fn default_setup_delay_ms() -> u64 {
    3000
}
fn default_retry_base_ms() -> u64 {
    1000
}
fn default_max_setup_attempts() -> u32 {
    6
}

/// The fixed set of loadable modules, with their parsed configs.
#[derive(Debug, Clone)]
pub enum ModuleKind {
    EncryptedRoomFilter(EncryptedRoomFilterConfig),
    CallPermissions(CallPermissionsConfig),
}

impl ModuleKind {
    /// Resolve a `modules:` entry by name and parse its config.
    pub fn from_entry(entry: &ModuleEntry) -> Result<Self> {
        match entry.module.as_str() {
            ENCRYPTED_ROOM_FILTER => {
                let cfg: EncryptedRoomFilterConfig = parse_module_config(entry)?;
                Ok(ModuleKind::EncryptedRoomFilter(cfg))
            }
            CALL_PERMISSIONS_MODULE => {
                let cfg: CallPermissionsConfig = parse_module_config(entry)?;
                cfg.validate()?;
                Ok(ModuleKind::CallPermissions(cfg))
            }
            other => Err(RoomGuardError::MisconfiguredModule(format!(
                "unknown module: {other}"
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ModuleKind::EncryptedRoomFilter(_) => ENCRYPTED_ROOM_FILTER,
            ModuleKind::CallPermissions(_) => CALL_PERMISSIONS_MODULE,
        }
    }
}

fn parse_module_config<T: serde::de::DeserializeOwned>(entry: &ModuleEntry) -> Result<T> {
    // `config:` left empty means "all defaults".
    let value = match &entry.config {
        serde_yaml::Value::Null => serde_yaml::Value::Mapping(serde_yaml::Mapping::new()),
        v => v.clone(),
    };
    serde_yaml::from_value(value).map_err(|e| {
        RoomGuardError::MisconfiguredModule(format!("{}: {e}", entry.module))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(module: &str, config: &str) -> ModuleEntry {
        ModuleEntry {
            module: module.into(),
            config: serde_yaml::from_str(config).unwrap(),
        }
    }

    #[test]
    fn call_defaults_follow_module_docs() {
        let m = ModuleKind::from_entry(&entry(CALL_PERMISSIONS_MODULE, "~")).unwrap();
        let ModuleKind::CallPermissions(cfg) = m else {
            panic!("wrong variant");
        };
        assert!(cfg.enable_auto_call_permissions);
        assert_eq!(cfg.call_permission_level, 0);
        assert!(cfg.also_set_events_default);
        assert_eq!(cfg.excluded_room_types, vec!["m.space".to_string()]);
        assert_eq!(cfg.max_setup_attempts, 6);
    }

    #[test]
    fn typo_in_module_config_is_fatal() {
        let err = ModuleKind::from_entry(&entry(ENCRYPTED_ROOM_FILTER, "patch_power_level: true"))
            .unwrap_err();
        assert!(matches!(err, RoomGuardError::MisconfiguredModule(_)));
    }

    #[test]
    fn empty_prefix_is_rejected() {
        let err = ModuleKind::from_entry(&entry(
            CALL_PERMISSIONS_MODULE,
            "excluded_room_prefixes: [\"#admin:\", \"\"]",
        ))
        .unwrap_err();
        assert!(matches!(err, RoomGuardError::MisconfiguredModule(_)));
    }

    #[test]
    fn unknown_module_name() {
        let err = ModuleKind::from_entry(&entry("spam_checker.Module", "{}")).unwrap_err();
        assert_eq!(err.client_code().as_str(), "M_UNKNOWN");
    }
}

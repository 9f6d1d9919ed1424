use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;

use serde::Deserialize;
use roomguard_core::error::{Result, RoomGuardError};

/// Homeserver configuration file.
///
/// Sections owned by the homeserver (listeners, database, SSO, federation)
/// are parsed leniently, since the server accepts many more keys than we
/// model. The `roomguard` section and module configs are strict.
#[derive(Debug, Deserialize)]
pub struct HomeserverConfig {
    pub server_name: String,

    #[serde(default)]
    pub listeners: Vec<ListenerConfig>,

    #[serde(default)]
    pub tls_certificate_path: Option<String>,
    #[serde(default)]
    pub tls_private_key_path: Option<String>,

    #[serde(default)]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub trusted_key_servers: Vec<TrustedKeyServer>,

    #[serde(default)]
    pub oidc_providers: Vec<OidcProvider>,

    #[serde(default)]
    pub modules: Vec<ModuleEntry>,

    #[serde(default)]
    pub roomguard: RoomGuardSection,

    /// Every other homeserver key, kept but not interpreted.
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_yaml::Value>,
}

impl HomeserverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.server_name.trim().is_empty() {
            return Err(RoomGuardError::BadConfig("server_name must not be empty".into()));
        }

        let has_tls_listener = self.listeners.iter().any(|l| l.tls);
        if has_tls_listener
            && (self.tls_certificate_path.is_none() || self.tls_private_key_path.is_none())
        {
            return Err(RoomGuardError::BadConfig(
                "tls listener requires tls_certificate_path and tls_private_key_path".into(),
            ));
        }
        for l in &self.listeners {
            l.validate()?;
        }

        if let Some(db) = &self.database {
            db.validate()?;
        }

        for k in &self.trusted_key_servers {
            if k.server_name.trim().is_empty() {
                return Err(RoomGuardError::BadConfig(
                    "trusted_key_servers[].server_name must not be empty".into(),
                ));
            }
        }

        let mut idp_ids = HashSet::new();
        for p in &self.oidc_providers {
            p.validate()?;
            if !idp_ids.insert(p.idp_id.as_str()) {
                return Err(RoomGuardError::BadConfig(format!(
                    "duplicate oidc idp_id: {}",
                    p.idp_id
                )));
            }
        }

        self.roomguard.validate()?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct ListenerConfig {
    pub port: u16,
    #[serde(default)]
    pub bind_addresses: Vec<String>,
    #[serde(default)]
    pub tls: bool,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub x_forwarded: bool,
    #[serde(default)]
    pub resources: Vec<ListenerResource>,
}

#[derive(Debug, Deserialize)]
pub struct ListenerResource {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub compress: bool,
}

impl ListenerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(RoomGuardError::BadConfig("listeners[].port must not be 0".into()));
        }
        if !matches!(self.kind.as_str(), "http" | "manhole" | "metrics" | "replication") {
            return Err(RoomGuardError::BadConfig(format!(
                "listeners[].type unsupported: {}",
                self.kind
            )));
        }
        for a in &self.bind_addresses {
            if a.parse::<std::net::IpAddr>().is_err() {
                return Err(RoomGuardError::BadConfig(format!(
                    "listeners[].bind_addresses has invalid address: {a}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    pub name: String,
    #[serde(default)]
    pub args: DatabaseArgs,
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<()> {
        match self.name.as_str() {
            "psycopg2" => {
                if self.args.database.is_none() {
                    return Err(RoomGuardError::BadConfig(
                        "database.args.database is required for psycopg2".into(),
                    ));
                }
            }
            "sqlite3" => {}
            other => {
                return Err(RoomGuardError::BadConfig(format!(
                    "database.name unsupported: {other}"
                )))
            }
        }
        self.args.validate()
    }
}

/// Connection arguments. Pool sizes and TCP keepalive tuning are checked,
/// the rest is handed to the driver as-is.
#[derive(Debug, Deserialize)]
pub struct DatabaseArgs {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default = "default_cp_min")]
    pub cp_min: u32,
    #[serde(default = "default_cp_max")]
    pub cp_max: u32,

    #[serde(default)]
    pub keepalives: Option<u8>,
    #[serde(default)]
    pub keepalives_idle: Option<u32>,
    #[serde(default)]
    pub keepalives_interval: Option<u32>,
    #[serde(default)]
    pub keepalives_count: Option<u32>,
}

impl Default for DatabaseArgs {
    fn default() -> Self {
        Self {
            user: None,
            password: None,
            database: None,
            host: None,
            port: None,
            cp_min: default_cp_min(),
            cp_max: default_cp_max(),
            keepalives: None,
            keepalives_idle: None,
            keepalives_interval: None,
            keepalives_count: None,
        }
    }
}

impl DatabaseArgs {
    pub fn validate(&self) -> Result<()> {
        if self.cp_min == 0 {
            return Err(RoomGuardError::BadConfig("database.args.cp_min must be >= 1".into()));
        }
        if self.cp_min > self.cp_max {
            return Err(RoomGuardError::BadConfig(
                "database.args.cp_min must not exceed cp_max".into(),
            ));
        }
        if let Some(k) = self.keepalives {
            if k > 1 {
                return Err(RoomGuardError::BadConfig(
                    "database.args.keepalives must be 0 or 1".into(),
                ));
            }
        }
        if self.keepalives == Some(0)
            && (self.keepalives_idle.is_some()
                || self.keepalives_interval.is_some()
                || self.keepalives_count.is_some())
        {
            tracing::warn!("database keepalive tuning is set but keepalives = 0");
        }
        Ok(())
    }
}

fn default_cp_min() -> u32 {
    5
}
fn default_cp_max() -> u32 {
    10
}

#[derive(Debug, Deserialize)]
pub struct TrustedKeyServer {
    pub server_name: String,
    #[serde(default)]
    pub verify_keys: BTreeMap<String, String>,
    #[serde(default)]
    pub accept_keys_insecurely: bool,
}

#[derive(Debug, Deserialize)]
pub struct OidcProvider {
    pub idp_id: String,
    #[serde(default)]
    pub idp_name: Option<String>,
    pub issuer: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub client_secret_path: Option<String>,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_true")]
    pub discover: bool,
    #[serde(default)]
    pub user_mapping_provider: Option<UserMappingProvider>,
}

#[derive(Debug, Deserialize)]
pub struct UserMappingProvider {
    #[serde(default)]
    pub config: ClaimTemplates,
}

/// Jinja-style templates mapping IdP claims onto the local account.
#[derive(Debug, Deserialize, Default)]
pub struct ClaimTemplates {
    #[serde(default)]
    pub subject_claim: Option<String>,
    #[serde(default)]
    pub localpart_template: Option<String>,
    #[serde(default)]
    pub display_name_template: Option<String>,
    #[serde(default)]
    pub email_template: Option<String>,
}

impl OidcProvider {
    pub fn validate(&self) -> Result<()> {
        let id_ok = !self.idp_id.is_empty()
            && self
                .idp_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !id_ok {
            return Err(RoomGuardError::BadConfig(format!(
                "oidc_providers[].idp_id invalid: {:?}",
                self.idp_id
            )));
        }
        if !(self.issuer.starts_with("https://") || self.issuer.starts_with("http://")) {
            return Err(RoomGuardError::BadConfig(format!(
                "oidc provider {} issuer must be an http(s) url",
                self.idp_id
            )));
        }
        if self.client_id.trim().is_empty() {
            return Err(RoomGuardError::BadConfig(format!(
                "oidc provider {} client_id must not be empty",
                self.idp_id
            )));
        }
        if self.client_secret.is_some() && self.client_secret_path.is_some() {
            return Err(RoomGuardError::BadConfig(format!(
                "oidc provider {} sets both client_secret and client_secret_path",
                self.idp_id
            )));
        }
        if !self.scopes.iter().any(|s| s == "openid") {
            return Err(RoomGuardError::BadConfig(format!(
                "oidc provider {} scopes must include openid",
                self.idp_id
            )));
        }
        if let Some(ump) = &self.user_mapping_provider {
            let c = &ump.config;
            for (name, tpl) in [
                ("localpart_template", &c.localpart_template),
                ("display_name_template", &c.display_name_template),
                ("email_template", &c.email_template),
            ] {
                if let Some(t) = tpl {
                    if !(t.contains("{{") && t.contains("}}")) {
                        return Err(RoomGuardError::BadConfig(format!(
                            "oidc provider {} {name} is not a template: {t}",
                            self.idp_id
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn default_scopes() -> Vec<String> {
    vec!["openid".into()]
}
fn default_true() -> bool {
    true
}

/// One `modules:` entry. `config` is resolved by the module registry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleEntry {
    pub module: String,
    #[serde(default)]
    pub config: serde_yaml::Value,
}

/// Sidecar settings.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomGuardSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_provision_queue")]
    pub provision_queue: usize,

    /// Rooms provisioned at the same time. Further jobs wait in the queue.
    #[serde(default = "default_provision_concurrency")]
    pub provision_concurrency: usize,

    #[serde(default = "default_drain_grace_ms")]
    pub drain_grace_ms: u64,

    /// Where the provisioner reads and writes room state.
    #[serde(default)]
    pub homeserver: Option<HomeserverApiConfig>,
}

impl Default for RoomGuardSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            provision_queue: default_provision_queue(),
            provision_concurrency: default_provision_concurrency(),
            drain_grace_ms: default_drain_grace_ms(),
            homeserver: None,
        }
    }
}

impl RoomGuardSection {
    pub fn validate(&self) -> Result<()> {
        if self.listen.parse::<SocketAddr>().is_err() {
            return Err(RoomGuardError::BadConfig(
                "roomguard.listen must be a valid SocketAddr".into(),
            ));
        }
        if !(1..=65536).contains(&self.provision_queue) {
            return Err(RoomGuardError::BadConfig(
                "roomguard.provision_queue must be between 1 and 65536".into(),
            ));
        }
        if !(1..=1024).contains(&self.provision_concurrency) {
            return Err(RoomGuardError::BadConfig(
                "roomguard.provision_concurrency must be between 1 and 1024".into(),
            ));
        }
        if self.drain_grace_ms > 60000 {
            return Err(RoomGuardError::BadConfig(
                "roomguard.drain_grace_ms must be at most 60000".into(),
            ));
        }
        if let Some(hs) = &self.homeserver {
            hs.validate()?;
        }
        Ok(())
    }
}

/// Homeserver access for the provisioner.
///
/// Reads go through the admin room-state API with an admin token. Writes go
/// through the client API as an application service, masquerading as the
/// room admin. Tokens are taken from the environment, never from this file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HomeserverApiConfig {
    pub base_url: String,

    #[serde(default = "default_admin_token_env")]
    pub admin_token_env: String,

    #[serde(default = "default_as_token_env")]
    pub as_token_env: String,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl HomeserverApiConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(RoomGuardError::BadConfig(
                "roomguard.homeserver.base_url must be an http(s) url".into(),
            ));
        }
        if self.admin_token_env.trim().is_empty() || self.as_token_env.trim().is_empty() {
            return Err(RoomGuardError::BadConfig(
                "roomguard.homeserver token env names must not be empty".into(),
            ));
        }
        if !(1..=60000).contains(&self.request_timeout_ms) {
            return Err(RoomGuardError::BadConfig(
                "roomguard.homeserver.request_timeout_ms must be between 1 and 60000".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:9100".into()
}
fn default_provision_queue() -> usize {
    1024
}
fn default_provision_concurrency() -> usize {
    16
}
fn default_drain_grace_ms() -> u64 {
    2000
}
fn default_admin_token_env() -> String {
    "ROOMGUARD_ADMIN_TOKEN".into()
}
fn default_as_token_env() -> String {
    "ROOMGUARD_AS_TOKEN".into()
}
fn default_request_timeout_ms() -> u64 {
    10000
}

//! Shared application state for the roomguard sidecar.
//!
//! Built once at startup from the homeserver config: the module chain, the
//! homeserver client used by provisioners and the metrics registry. Startup
//! errors are returned, never panicked on.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinHandle;

use roomguard_core::error::Result;

use crate::config::{self, HomeserverConfig};
use crate::dispatch::{build_modules, BuiltModules};
use crate::obs::metrics::HostMetrics;
use crate::policy::PolicyEngine;
use crate::services::Provisioner;
use crate::state::{HomeserverClient, RoomStateApi};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
    engine: Arc<PolicyEngine>,
    metrics: Arc<HostMetrics>,
}

struct AppStateInner {
    cfg: HomeserverConfig,
    /// Provisioner workers built at startup; readiness waits for all of them.
    workers_expected: usize,
}

impl AppState {
    /// Build application state from config, connecting to the homeserver
    /// when `roomguard.homeserver` is set.
    pub fn new(cfg: HomeserverConfig) -> Result<(Self, Vec<Provisioner>)> {
        let api = match &cfg.roomguard.homeserver {
            Some(hs) => Some(Arc::new(HomeserverClient::from_config(hs)?) as Arc<dyn RoomStateApi>),
            None => None,
        };
        Self::with_api(cfg, api)
    }

    /// Build application state over a given room state API.
    /// The returned provisioners must be started with
    /// [`AppState::spawn_provisioners`] once a tokio runtime is running.
    pub fn with_api(
        cfg: HomeserverConfig,
        api: Option<Arc<dyn RoomStateApi>>,
    ) -> Result<(Self, Vec<Provisioner>)> {
        // 1) Resolve module names + configs (fatal on any misconfiguration)
        let kinds = config::resolve_modules(&cfg)?;

        {
            let mut seen = HashSet::new();
            for k in &kinds {
                if !seen.insert(k.name()) {
                    tracing::warn!(module = k.name(), "module listed more than once; it will run once per entry");
                }
            }
        }
        if kinds.is_empty() {
            tracing::warn!("no modules configured; every event will pass");
        }

        // 2) Module chain, in config order
        let metrics = Arc::new(HostMetrics::default());
        let BuiltModules { engine, provisioners } =
            build_modules(kinds, api, Arc::clone(&metrics), &cfg.roomguard)?;

        Ok((
            Self {
                inner: Arc::new(AppStateInner {
                    cfg,
                    workers_expected: provisioners.len(),
                }),
                engine: Arc::new(engine),
                metrics,
            },
            provisioners,
        ))
    }

    /// Start provisioners with this state's module chain as their gate.
    pub fn spawn_provisioners(&self, provisioners: Vec<Provisioner>) -> Vec<JoinHandle<()>> {
        provisioners
            .into_iter()
            .map(|p| p.spawn(Arc::clone(&self.engine)))
            .collect()
    }

    pub fn cfg(&self) -> &HomeserverConfig {
        &self.inner.cfg
    }

    pub fn engine(&self) -> &PolicyEngine {
        &self.engine
    }

    pub fn metrics(&self) -> &HostMetrics {
        &self.metrics
    }

    pub fn workers_expected(&self) -> usize {
        self.inner.workers_expected
    }

    pub fn workers_running(&self) -> usize {
        self.metrics.provision_workers.get(&[]).max(0) as usize
    }

    pub fn set_draining(&self) {
        self.metrics.set_draining();
    }

    pub fn is_draining(&self) -> bool {
        self.metrics.is_draining()
    }

    /// Extra gauge lines for `/metrics`.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        vec![("roomguard_modules_loaded", self.engine.module_names().len() as u64)]
    }
}

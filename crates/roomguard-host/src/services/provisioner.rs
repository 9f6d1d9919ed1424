//! Call-permission provisioner.
//!
//! When the call filter sees a new room, it queues the room here. A worker
//! waits for the room's power levels to exist (delayed start, then
//! exponential backoff), patches the call levels, and sends the new
//! power-levels event as a room admin.
//!
//! At most `concurrency` rooms are handled at once; the worker stops taking
//! jobs off the queue while every slot is busy, so the queue fills up.
//! Enqueueing never blocks the hook path: a full queue drops the job with a
//! warning. The inline filter still covers every later power-levels event.
//!
//! The patched event passes through the module chain before it is sent, so
//! every other module's rewrites apply to it as well.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use roomguard_core::error::{Result, RoomGuardError};
use roomguard_core::event::power_levels::ADMIN_LEVEL;
use roomguard_core::event::{PowerLevels, StateEvent, ROOM_POWER_LEVELS};

use crate::config::CallPermissionsConfig;
use crate::obs::metrics::HostMetrics;
use crate::policy::call_permissions::apply_call_levels;
use crate::policy::{PolicyDecision, PolicyEngine};
use crate::state::RoomStateApi;

/// Event types logged after a successful patch.
const VERIFY_TYPES: [&str; 3] = ["m.call.invite", "m.call.member", "org.matrix.msc3401.call.member"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionJob {
    pub room_id: String,
    pub creator: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Applied { event_id: String, changes: usize, verified: bool },
    AlreadyCorrect,
    NeverReady,
}

impl ProvisionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ProvisionOutcome::Applied { .. } => "applied",
            ProvisionOutcome::AlreadyCorrect => "already_correct",
            ProvisionOutcome::NeverReady => "never_ready",
        }
    }
}

/// Sending half, held by the call filter.
#[derive(Clone)]
pub struct ProvisionQueue {
    tx: mpsc::Sender<ProvisionJob>,
    metrics: Arc<HostMetrics>,
}

impl ProvisionQueue {
    /// Queue a room. Returns false when the job was dropped.
    pub fn enqueue(&self, job: ProvisionJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!(room = %job.room_id, "provision queue full, dropping job");
                self.metrics.provision_jobs.inc(&[("outcome", "dropped")]);
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!(room = %job.room_id, "provisioner stopped, dropping job");
                self.metrics.provision_jobs.inc(&[("outcome", "dropped")]);
                false
            }
        }
    }
}

/// Receiving half; spawn it once the runtime is up.
pub struct Provisioner {
    cfg: Arc<CallPermissionsConfig>,
    api: Arc<dyn RoomStateApi>,
    metrics: Arc<HostMetrics>,
    slots: Arc<Semaphore>,
    rx: mpsc::Receiver<ProvisionJob>,
}

pub fn channel(
    cfg: Arc<CallPermissionsConfig>,
    api: Arc<dyn RoomStateApi>,
    metrics: Arc<HostMetrics>,
    capacity: usize,
    concurrency: usize,
) -> (ProvisionQueue, Provisioner) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let queue = ProvisionQueue {
        tx,
        metrics: Arc::clone(&metrics),
    };
    let slots = Arc::new(Semaphore::new(concurrency.max(1)));
    (queue, Provisioner { cfg, api, metrics, slots, rx })
}

impl Provisioner {
    /// Run on the current runtime. `gate` is the module chain every outgoing
    /// power-levels event is checked against.
    pub fn spawn(self, gate: Arc<PolicyEngine>) -> JoinHandle<()> {
        tokio::spawn(self.run(gate))
    }

    /// Handle jobs until every queue handle is dropped.
    pub async fn run(mut self, gate: Arc<PolicyEngine>) {
        self.metrics.provision_workers.inc(&[]);
        loop {
            // Take a slot first: while all are busy, jobs stay queued.
            let Ok(slot) = Arc::clone(&self.slots).acquire_owned().await else {
                break;
            };
            let Some(job) = self.rx.recv().await else {
                break;
            };

            let cfg = Arc::clone(&self.cfg);
            let api = Arc::clone(&self.api);
            let metrics = Arc::clone(&self.metrics);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                let _slot = slot;
                metrics.provision_inflight.inc(&[]);
                let outcome = match provision_room(api.as_ref(), &gate, &cfg, &job).await {
                    Ok(o) => o.label(),
                    Err(e) => {
                        tracing::error!(room = %job.room_id, error = %e, "call permission setup failed");
                        "error"
                    }
                };
                metrics.provision_jobs.inc(&[("outcome", outcome)]);
                metrics.provision_inflight.dec(&[]);
            });
        }
        self.metrics.provision_workers.dec(&[]);
        tracing::debug!("provisioner queue closed");
    }
}

/// Wait for the room's power levels, then patch them.
pub async fn provision_room(
    api: &dyn RoomStateApi,
    gate: &PolicyEngine,
    cfg: &CallPermissionsConfig,
    job: &ProvisionJob,
) -> Result<ProvisionOutcome> {
    tokio::time::sleep(Duration::from_millis(cfg.setup_delay_ms)).await;

    let max = cfg.max_setup_attempts;
    for attempt in 0..max {
        tracing::debug!(room = %job.room_id, attempt = attempt + 1, max, "checking room readiness");

        if let Some(current) = api.get_state_event(&job.room_id, ROOM_POWER_LEVELS, "").await? {
            tracing::info!(room = %job.room_id, "room is ready");
            return setup_call_permissions(api, gate, cfg, job, current).await;
        }

        if attempt + 1 < max {
            let wait = cfg.retry_base_ms.saturating_mul(1u64 << attempt);
            tracing::debug!(room = %job.room_id, wait_ms = wait, "room not ready, retrying");
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }
    }

    tracing::error!(room = %job.room_id, attempts = max, "room never became ready");
    Ok(ProvisionOutcome::NeverReady)
}

async fn setup_call_permissions(
    api: &dyn RoomStateApi,
    gate: &PolicyEngine,
    cfg: &CallPermissionsConfig,
    job: &ProvisionJob,
    current: StateEvent,
) -> Result<ProvisionOutcome> {
    let mut content = current.content_object()?.clone();
    let changes = apply_call_levels(cfg, &mut content)?;

    if changes.is_empty() {
        tracing::info!(room = %job.room_id, "call permissions already correct");
        return Ok(ProvisionOutcome::AlreadyCorrect);
    }

    tracing::info!(room = %job.room_id, changes = changes.len(), "applying call permission changes");
    for c in changes.iter().take(5) {
        tracing::info!(room = %job.room_id, change = %c);
    }

    let sender = PowerLevels::new(&content)
        .first_user_at_least(ADMIN_LEVEL)?
        .map(str::to_owned)
        .unwrap_or_else(|| job.creator.clone());
    tracing::debug!(room = %job.room_id, sender = %sender, "sending power levels");

    let event = StateEvent::new(ROOM_POWER_LEVELS, job.room_id.clone(), sender, Value::Object(content));
    let event = match gate.check_event(&event) {
        PolicyDecision::Pass => event,
        PolicyDecision::Rewrite(ev) => ev,
        PolicyDecision::Reject { code, msg } => {
            return Err(RoomGuardError::PolicyViolation(format!(
                "patched power levels refused by module chain ({}): {msg}",
                code.as_str()
            )));
        }
    };
    let event_id = api.send_state_event(event).await?;
    tracing::info!(room = %job.room_id, event_id = %event_id, "call permissions set");

    let verified = verify_permissions(api, cfg, &job.room_id).await?;
    Ok(ProvisionOutcome::Applied {
        event_id,
        changes: changes.len(),
        verified,
    })
}

/// Re-read the room and log the levels that matter for calls.
async fn verify_permissions(
    api: &dyn RoomStateApi,
    cfg: &CallPermissionsConfig,
    room_id: &str,
) -> Result<bool> {
    let Some(ev) = api.get_state_event(room_id, ROOM_POWER_LEVELS, "").await? else {
        return Ok(false);
    };
    let pl = PowerLevels::new(ev.content_object()?);

    let mut ok = true;
    for ty in VERIFY_TYPES {
        let level = pl.effective_event_level(ty)?;
        let matches = level == cfg.call_permission_level;
        ok &= matches;
        tracing::info!(room = %room_id, event_type = ty, level, ok = matches, "verify");
    }
    Ok(ok)
}

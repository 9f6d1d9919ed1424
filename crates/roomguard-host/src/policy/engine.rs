use std::sync::Arc;

use roomguard_core::error::{ClientCode, Result};
use roomguard_core::event::{CreateRoomRequest, StateEvent};

use crate::dispatch::{EventPolicyHook, HookOutcome};

/// Decision from running the module chain over one event.
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyDecision {
    /// Event goes through unchanged.
    Pass,
    /// Event goes through with the content produced by the chain.
    Rewrite(StateEvent),
    /// Event is refused.
    Reject { code: ClientCode, msg: String },
}

impl PolicyDecision {
    /// Label used in metrics.
    pub fn label(&self) -> &'static str {
        match self {
            PolicyDecision::Pass => "pass",
            PolicyDecision::Rewrite(_) => "rewrite",
            PolicyDecision::Reject { .. } => "reject",
        }
    }
}

/// Ordered module chain.
/// Construct once at startup, then share via Arc.
#[derive(Default)]
pub struct PolicyEngine {
    hooks: Vec<Arc<dyn EventPolicyHook>>,
}

impl PolicyEngine {
    pub fn new(hooks: Vec<Arc<dyn EventPolicyHook>>) -> Self {
        Self { hooks }
    }

    pub fn module_names(&self) -> Vec<&'static str> {
        self.hooks.iter().map(|h| h.name()).collect()
    }

    /// Run every module in config order. Each module sees the previous
    /// module's output; the first refusal wins.
    pub fn check_event(&self, event: &StateEvent) -> PolicyDecision {
        let mut current: Option<StateEvent> = None;

        for hook in &self.hooks {
            let ev = current.as_ref().unwrap_or(event);
            match hook.check_event_allowed(ev) {
                Ok(HookOutcome::Pass) => {}
                Ok(HookOutcome::Rewrite(content)) => {
                    let mut next = ev.clone();
                    next.content = content;
                    current = Some(next);
                }
                Err(e) => {
                    tracing::info!(
                        module = hook.name(),
                        room = %event.room_id,
                        event_type = %event.event_type,
                        error = %e,
                        "event rejected"
                    );
                    return PolicyDecision::Reject {
                        code: e.client_code(),
                        msg: e.to_string(),
                    };
                }
            }
        }

        match current {
            Some(ev) if ev != *event => PolicyDecision::Rewrite(ev),
            _ => PolicyDecision::Pass,
        }
    }

    /// Let every module inspect and rewrite a room creation request.
    pub fn check_create_room(&self, mut req: CreateRoomRequest) -> Result<CreateRoomRequest> {
        for hook in &self.hooks {
            if let Err(e) = hook.on_create_room(&mut req) {
                tracing::info!(module = hook.name(), error = %e, "room creation rejected");
                return Err(e);
            }
        }
        Ok(req)
    }
}

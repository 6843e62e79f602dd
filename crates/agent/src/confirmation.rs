//! Plans held for approval.
//!
//! A paused run holds nothing but an entry here. The caller resumes it
//! later, possibly from a different task.

use std::collections::HashMap;
use std::sync::Mutex;
use toolgate_core::AgentError;

use crate::ledger::{AgentPlan, ConfirmationRequest, PlanStatus};

/// A plan waiting on the caller.
#[derive(Debug, Clone)]
pub struct PendingPlan {
    pub plan: AgentPlan,
    pub confirmation: ConfirmationRequest,
}

#[derive(Debug, Default)]
pub struct ConfirmationStore {
    pending: Mutex<HashMap<String, PendingPlan>>,
}

impl ConfirmationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, pending: PendingPlan) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pending.plan.id.clone(), pending);
    }

    /// Remove and return a plan so it can be resolved exactly once.
    pub fn take(&self, plan_id: &str) -> Result<PendingPlan, AgentError> {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let entry = pending
            .get(plan_id)
            .ok_or_else(|| AgentError::PlanNotFound(plan_id.to_string()))?;
        if entry.plan.status != PlanStatus::AwaitingConfirmation {
            return Err(AgentError::InvalidPlanState {
                plan_id: plan_id.to_string(),
                status: entry.plan.status.to_string(),
            });
        }
        pending
            .remove(plan_id)
            .ok_or_else(|| AgentError::PlanNotFound(plan_id.to_string()))
    }

    pub fn get(&self, plan_id: &str) -> Option<PendingPlan> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(plan_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

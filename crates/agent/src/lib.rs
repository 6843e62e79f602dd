//! The agent loop.
//!
//! A run follows a **stream → gate → dispatch / confirm** cycle:
//!
//! 1. **Stream** one assistant turn, reassembling tool calls from deltas
//! 2. **Validate** the calls; malformed ones are dropped
//! 3. **Gate** the batch: no calls ends the run, any destructive call holds
//!    the whole batch for confirmation, otherwise everything is dispatched
//! 4. **Dispatch** in order, append each result, loop back to step 1
//!
//! A held batch is resolved later with [`AgentLoop::resume`]. Approved plans
//! execute exactly the steps shown to the user.

pub mod accumulator;
pub mod confirmation;
pub mod dispatch;
pub mod gate;
pub mod history;
pub mod ledger;
pub mod prompt;
pub mod runner;
pub mod stream_event;
pub mod thinking;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use confirmation::{ConfirmationStore, PendingPlan};
pub use gate::GateDecision;
pub use ledger::{
    AgentExecution, AgentPlan, ConfirmationRequest, EstimatedImpact, ExecutionStatus,
    ExecutionStep, PlanStatus, PlanStep, StepStatus, UndoAction,
};
pub use runner::{AgentLoop, DEFAULT_MAX_ITERATIONS, Resolution, RunError, RunOutcome, RunRequest};
pub use stream_event::AgentStreamEvent;

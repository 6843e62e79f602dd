//! The destructive gate.
//!
//! The decision is made per batch: one destructive call anywhere in the
//! batch holds every call in it for confirmation.

use toolgate_core::ToolCall;
use toolgate_tools::ToolRegistry;

/// What the loop does with a validated batch.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// No calls: the assistant message is the final answer.
    Terminal,
    /// Run every call now.
    Dispatch(Vec<ToolCall>),
    /// Hold the whole batch until the caller approves it.
    Confirm(Vec<ToolCall>),
}

pub fn decide(registry: &ToolRegistry, calls: Vec<ToolCall>) -> GateDecision {
    if calls.is_empty() {
        GateDecision::Terminal
    } else if calls.iter().any(|c| registry.is_destructive(&c.name)) {
        GateDecision::Confirm(calls)
    } else {
        GateDecision::Dispatch(calls)
    }
}

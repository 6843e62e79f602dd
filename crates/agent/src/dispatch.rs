//! Turn validated calls into recorded execution steps.

use chrono::Utc;
use toolgate_core::{AgentMode, ToolCall, ToolError, ToolOutcome};
use toolgate_tools::{ToolExecutor, is_allowed_in_mode};
use tracing::warn;

use crate::ledger::{ExecutionStep, StepStatus, build_undo_action};

/// Run one call under `mode` and record it.
///
/// A call the mode does not allow is recorded as failed without reaching
/// the executor.
pub async fn execute_step(
    executor: &ToolExecutor,
    call: &ToolCall,
    plan_id: &str,
    mode: AgentMode,
) -> ExecutionStep {
    let registry = executor.registry();
    let mut step = ExecutionStep {
        id: call.id.clone(),
        tool_call_id: call.id.clone(),
        plan_id: plan_id.to_string(),
        tool: call.name.clone(),
        args: call.arguments.clone(),
        status: StepStatus::Running,
        result: None,
        affected_entity_ids: Vec::new(),
        undo_action: None,
        timestamp: Utc::now(),
    };

    if !is_allowed_in_mode(registry, &call.name, mode) {
        warn!(tool = %call.name, mode = %mode, "Tool call refused in read-only mode");
        step.status = StepStatus::Failed;
        step.result = Some(ToolOutcome::from(ToolError::NotAllowed {
            tool_name: call.name.clone(),
            mode: mode.to_string(),
        }));
        return step;
    }

    let outcome = executor.execute(call).await;
    step.status = if outcome.success {
        StepStatus::Completed
    } else {
        StepStatus::Failed
    };
    step.affected_entity_ids = outcome.affected_entity_ids.clone();
    step.undo_action = build_undo_action(registry, &call.name, &call.arguments);
    step.result = Some(outcome);
    step
}

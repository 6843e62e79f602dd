//! Plans, confirmation requests and execution records.
//!
//! Everything here is plain data plus pure builders. The loop owns the
//! transitions; the ledger only records them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use toolgate_core::{ToolCall, ToolOutcome};
use toolgate_tools::ToolRegistry;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    AwaitingConfirmation,
    Executing,
    Completed,
    Failed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::AwaitingConfirmation => "awaiting_confirmation",
            PlanStatus::Executing => "executing",
            PlanStatus::Completed => "completed",
            PlanStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a plan step or an executed step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    #[serde(alias = "done")]
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub tool: String,
    pub description: String,
    pub args: serde_json::Value,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentPlan {
    pub id: String,
    pub description: String,
    pub steps: Vec<PlanStep>,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimatedImpact {
    pub steps_affected: usize,
    pub is_destructive: bool,
}

/// What the caller is asked to approve. A projection of a pending plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub plan_id: String,
    pub description: String,
    pub steps: Vec<PlanStep>,
    pub estimated_impact: EstimatedImpact,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndoAction {
    pub tool: String,
    pub args: serde_json::Value,
}

/// One dispatched (or refused) tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub id: String,
    pub tool_call_id: String,
    pub plan_id: String,
    pub tool: String,
    pub args: serde_json::Value,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolOutcome>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_entity_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undo_action: Option<UndoAction>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionStep {
    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Completed
    }

    /// Content of the `tool` message answering this step's call.
    pub fn message_content(&self) -> String {
        self.result
            .as_ref()
            .map(ToolOutcome::to_message_content)
            .unwrap_or_else(|| serde_json::Value::Null.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
}

/// Terminal audit record of the steps a run (or an approved plan)
/// dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentExecution {
    pub id: String,
    pub request: String,
    pub plan: AgentPlan,
    pub steps: Vec<ExecutionStep>,
    pub affected_entity_ids: Vec<String>,
    pub status: ExecutionStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl AgentExecution {
    /// Whether any step recorded an undo action.
    pub fn can_undo(&self) -> bool {
        self.steps.iter().any(|s| s.undo_action.is_some())
    }
}

/// Hold a batch for confirmation. `content` is the assistant text that
/// came with the calls.
pub fn build_confirmation(calls: &[ToolCall], content: &str) -> (AgentPlan, ConfirmationRequest) {
    let now = Utc::now();
    let steps: Vec<PlanStep> = calls
        .iter()
        .map(|call| PlanStep {
            id: Uuid::new_v4().to_string(),
            tool: call.name.clone(),
            description: format!("Execute {}", call.name),
            args: call.arguments.clone(),
            status: StepStatus::Pending,
            result: None,
        })
        .collect();

    let plan = AgentPlan {
        id: Uuid::new_v4().to_string(),
        description: non_empty_or(content, "Executing requested actions"),
        steps,
        status: PlanStatus::AwaitingConfirmation,
        created_at: now,
        updated_at: now,
    };

    let confirmation = ConfirmationRequest {
        plan_id: plan.id.clone(),
        description: non_empty_or(content, "This action requires confirmation"),
        steps: plan.steps.clone(),
        estimated_impact: EstimatedImpact {
            steps_affected: plan.steps.len(),
            is_destructive: true,
        },
    };

    (plan, confirmation)
}

/// The inverse call for a reversible tool: the undo tool with the same
/// arguments.
pub fn build_undo_action(
    registry: &ToolRegistry,
    tool: &str,
    args: &serde_json::Value,
) -> Option<UndoAction> {
    registry.undo_tool_for(tool).map(|undo| UndoAction {
        tool: undo.to_string(),
        args: args.clone(),
    })
}

/// Ids in first-seen order, each once.
pub fn dedup_ids<'a>(ids: impl IntoIterator<Item = &'a String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for id in ids {
        if seen.insert(id.as_str()) {
            out.push(id.clone());
        }
    }
    out
}

/// Project executed steps back onto plan steps.
pub fn plan_steps_from(steps: &[ExecutionStep]) -> Vec<PlanStep> {
    steps
        .iter()
        .map(|s| PlanStep {
            id: s.id.clone(),
            tool: s.tool.clone(),
            description: s.tool.clone(),
            args: s.args.clone(),
            status: s.status,
            result: s.result.clone(),
        })
        .collect()
}

/// Record for the steps a run dispatched without confirmation.
pub fn build_execution(request: &str, steps: Vec<ExecutionStep>) -> AgentExecution {
    let now = Utc::now();
    let plan = AgentPlan {
        id: Uuid::new_v4().to_string(),
        description: "Completed actions".into(),
        steps: plan_steps_from(&steps),
        status: PlanStatus::Completed,
        created_at: now,
        updated_at: now,
    };

    AgentExecution {
        id: Uuid::new_v4().to_string(),
        request: request.to_string(),
        plan,
        affected_entity_ids: dedup_ids(steps.iter().flat_map(|s| &s.affected_entity_ids)),
        steps,
        status: ExecutionStatus::Completed,
        created_at: now,
        completed_at: now,
    }
}

/// Record for an approved plan once its steps have run. The execution
/// takes the plan's id.
pub fn complete_plan(
    mut plan: AgentPlan,
    request: &str,
    steps: Vec<ExecutionStep>,
) -> AgentExecution {
    let now = Utc::now();
    let all_ok = steps.iter().all(ExecutionStep::succeeded);
    plan.status = if all_ok {
        PlanStatus::Completed
    } else {
        PlanStatus::Failed
    };
    plan.steps = plan_steps_from(&steps);
    plan.updated_at = now;

    AgentExecution {
        id: plan.id.clone(),
        request: request.to_string(),
        affected_entity_ids: dedup_ids(steps.iter().flat_map(|s| &s.affected_entity_ids)),
        status: if all_ok {
            ExecutionStatus::Completed
        } else {
            ExecutionStatus::Failed
        },
        plan,
        steps,
        created_at: now,
        completed_at: now,
    }
}

/// `Completed <ok>/<total> actions.`, plus the affected chat count.
pub fn completion_summary(execution: &AgentExecution) -> String {
    let ok = execution.steps.iter().filter(|s| s.succeeded()).count();
    let mut summary = format!("Completed {ok}/{} actions.", execution.steps.len());
    if !execution.affected_entity_ids.is_empty() {
        summary.push_str(&format!(
            " Affected {} chat(s).",
            execution.affected_entity_ids.len()
        ));
    }
    summary
}

fn non_empty_or(text: &str, fallback: &str) -> String {
    if text.trim().is_empty() {
        fallback.to_string()
    } else {
        text.to_string()
    }
}

//! Tool executor: budget enforcement, extra-group loading and dispatch to
//! the host [`ToolHandler`].
//!
//! Every path returns a [`ToolOutcome`]. A refused, unknown or failing call
//! is a failed outcome the model can read, never a run-fatal error.

use std::sync::Arc;
use std::time::Instant;
use toolgate_config::RateLimitConfig;
use toolgate_core::{ToolCall, ToolError, ToolHandler, ToolOutcome};
use tracing::{debug, warn};

use crate::budget::CallBudget;
use crate::registry::{ToolRegistry, USE_EXTRA_TOOL};

/// Executes validated tool calls.
///
/// Cheap to clone; clones share the registry, the handler and the budget.
/// Use [`ToolExecutor::for_request`] to get one with its own request counter.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    handler: Arc<dyn ToolHandler>,
    budget: Arc<CallBudget>,
}

impl ToolExecutor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        handler: Arc<dyn ToolHandler>,
        limits: &RateLimitConfig,
    ) -> Self {
        Self {
            registry,
            handler,
            budget: Arc::new(CallBudget::new(limits)),
        }
    }

    /// An executor for one request: a fresh per-request counter over the
    /// same registry, handler and minute window.
    pub fn for_request(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            handler: Arc::clone(&self.handler),
            budget: Arc::new(self.budget.fork()),
        }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub fn budget(&self) -> &CallBudget {
        &self.budget
    }

    /// Execute one call and return its outcome.
    pub async fn execute(&self, call: &ToolCall) -> ToolOutcome {
        if call.name == USE_EXTRA_TOOL {
            return self.load_extra_group(call);
        }

        if self.registry.get_tool(&call.name).is_none() {
            warn!(tool = %call.name, "Model called an unknown tool");
            return ToolError::NotFound(call.name.clone()).into();
        }

        if !self.registry.is_budget_exempt(&call.name) {
            let heavy = self.registry.is_heavy(&call.name);
            if let Err(e) = self.budget.acquire(heavy).await {
                warn!(tool = %call.name, error = %e, "Tool call refused by budget");
                return e.into();
            }
        }

        let start = Instant::now();
        let outcome = match self.handler.call(call).await {
            Ok(outcome) => outcome,
            Err(e) => e.into(),
        };
        debug!(
            tool = %call.name,
            success = outcome.success,
            duration_ms = start.elapsed().as_millis() as u64,
            "Tool executed"
        );
        outcome
    }

    fn load_extra_group(&self, call: &ToolCall) -> ToolOutcome {
        let requested = call
            .arguments
            .get("extraTool")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        let Some(group) = self.registry.extra_group(requested) else {
            let available: Vec<_> = self
                .registry
                .extra_groups()
                .iter()
                .map(|g| g.name.as_str())
                .collect();
            return ToolOutcome::failed(format!(
                "Unknown extra tool: {requested}. Available: {}",
                available.join(", ")
            ));
        };

        debug!(group = %group.name, tools = group.tools.len(), "Extra tool group loaded");
        ToolOutcome::ok(serde_json::json!({
            "extraToolLoaded": group.name,
            "message": format!(
                "{}. Tools available: {}",
                group.description,
                group.tool_names().join(", ")
            ),
            "instructions": group.context,
        }))
    }
}

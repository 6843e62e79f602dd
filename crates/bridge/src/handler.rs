//! Request handling shared by every transport.

use std::collections::HashSet;
use std::time::Duration;

use serde_json::Value;
use toolgate_core::{ToolCall, ToolOutcome};
use toolgate_tools::{ToolExecutor, ToolRegistry};
use tracing::{debug, info, warn};

use crate::protocol::{BridgeRequest, BridgeResponse, BridgeSkill, BridgeTool};

/// Answers bridge requests with a single-shot executor. No planning, no
/// confirmation: one request, one tool, one result.
#[derive(Clone)]
pub struct BridgeHandler {
    executor: ToolExecutor,
    timeout: Duration,
}

impl BridgeHandler {
    pub fn new(executor: ToolExecutor) -> Self {
        Self {
            executor,
            timeout: Duration::from_secs(30),
        }
    }

    /// Bound on a single `execute`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn registry(&self) -> &ToolRegistry {
        self.executor.registry()
    }

    /// Handle one raw text frame.
    pub async fn handle_text(&self, text: &str) -> BridgeResponse {
        match serde_json::from_str::<BridgeRequest>(text) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                warn!(error = %e, "Failed to parse bridge message");
                BridgeResponse::error(None, "Invalid JSON message")
            }
        }
    }

    pub async fn handle(&self, request: BridgeRequest) -> BridgeResponse {
        debug!(id = ?request.id, kind = %request.kind, "Bridge request");
        match request.kind.as_str() {
            "ping" => BridgeResponse::pong(request.id),
            "list_tools" => BridgeResponse::tools(request.id, self.list_tools()),
            "list_skills" => BridgeResponse::skills(request.id, self.list_skills()),
            "execute" => self.execute(request).await,
            other => BridgeResponse::error(request.id, format!("Unknown request type: {other}")),
        }
    }

    /// Core tools, then every extra group's tools, each name once.
    pub fn list_tools(&self) -> Vec<BridgeTool> {
        let registry = self.registry();
        let mut seen = HashSet::new();
        registry
            .core_definitions()
            .iter()
            .chain(registry.extra_groups().iter().flat_map(|g| g.tools.iter()))
            .filter(|def| seen.insert(def.name.as_str()))
            .map(BridgeTool::from)
            .collect()
    }

    pub fn list_skills(&self) -> Vec<BridgeSkill> {
        self.registry()
            .extra_groups()
            .iter()
            .map(|group| BridgeSkill {
                name: group.name.clone(),
                description: group.description.clone(),
                tools: group.tools.iter().map(BridgeTool::from).collect(),
            })
            .collect()
    }

    async fn execute(&self, request: BridgeRequest) -> BridgeResponse {
        let Some(tool) = request.tool.filter(|t| !t.is_empty()) else {
            return BridgeResponse::failed_result(request.id, "Missing tool name");
        };

        let call = ToolCall {
            id: request.id.clone().unwrap_or_else(|| format!("bridge_{tool}")),
            name: tool,
            arguments: match request.args {
                Some(Value::Null) | None => Value::Object(Default::default()),
                Some(args) => args,
            },
        };

        // Each bridge call is its own request for budget purposes
        let executor = self.executor.for_request();
        let outcome = match tokio::time::timeout(self.timeout, executor.execute(&call)).await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(tool = %call.name, timeout_secs = self.timeout.as_secs(), "Bridge execute timed out");
                ToolOutcome::failed(format!(
                    "Tool {} timed out after {} seconds",
                    call.name,
                    self.timeout.as_secs()
                ))
            }
        };

        info!(tool = %call.name, success = outcome.success, "Bridge execute");
        BridgeResponse::result(request.id, outcome)
    }
}

//! Bridge wire types.
//!
//! Requests: `{id?, type: ping|execute|list_tools|list_skills, tool?, args?}`.
//! Responses: `{id?, type: pong|result|tools|skills|error, success?, data?, error?, tools?}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use toolgate_core::{ToolDefinition, ToolOutcome};

/// A request from a bridge client.
///
/// `type` stays a string so an unknown type can still be answered with the
/// request's id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

impl BridgeRequest {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            tool: None,
            args: None,
        }
    }

    pub fn execute(id: impl Into<String>, tool: impl Into<String>, args: Value) -> Self {
        Self {
            id: Some(id.into()),
            kind: "execute".into(),
            tool: Some(tool.into()),
            args: Some(args),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Pong,
    Result,
    Tools,
    Skills,
    Error,
}

/// The answer to exactly one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(rename = "type")]
    pub kind: ResponseKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<BridgeTool>>,
}

impl BridgeResponse {
    fn empty(id: Option<String>, kind: ResponseKind) -> Self {
        Self {
            id,
            kind,
            success: None,
            data: None,
            error: None,
            tools: None,
        }
    }

    pub fn pong(id: Option<String>) -> Self {
        Self::empty(id, ResponseKind::Pong)
    }

    pub fn result(id: Option<String>, outcome: ToolOutcome) -> Self {
        Self {
            success: Some(outcome.success),
            data: outcome.data,
            error: outcome.error,
            ..Self::empty(id, ResponseKind::Result)
        }
    }

    /// A failed `result`, for an execute that never reached a tool.
    pub fn failed_result(id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            success: Some(false),
            error: Some(error.into()),
            ..Self::empty(id, ResponseKind::Result)
        }
    }

    pub fn tools(id: Option<String>, tools: Vec<BridgeTool>) -> Self {
        Self {
            tools: Some(tools),
            ..Self::empty(id, ResponseKind::Tools)
        }
    }

    pub fn skills(id: Option<String>, skills: Vec<BridgeSkill>) -> Self {
        Self {
            data: serde_json::to_value(skills).ok(),
            ..Self::empty(id, ResponseKind::Skills)
        }
    }

    pub fn error(id: Option<String>, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::empty(id, ResponseKind::Error)
        }
    }
}

/// A tool as external clients see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeTool {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: Value,
    pub required: Vec<String>,
}

impl From<&ToolDefinition> for BridgeTool {
    fn from(def: &ToolDefinition) -> Self {
        let properties = def
            .parameters
            .get("properties")
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()));
        Self {
            name: def.name.clone(),
            description: def.description.clone(),
            input_schema: InputSchema {
                kind: "object".into(),
                properties,
                required: def.required().into_iter().map(String::from).collect(),
            },
        }
    }
}

/// An extra tool group with its tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeSkill {
    pub name: String,
    pub description: String,
    pub tools: Vec<BridgeTool>,
}

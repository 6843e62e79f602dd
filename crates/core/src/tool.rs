//! Tool contract types and the host-side handler trait.
//!
//! The engine never implements tools itself: the chat/message/user data layer
//! lives in the host application and is reached through a [`ToolHandler`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;

/// A tool definition sent to the model so it knows what it may call.
///
/// `parameters` is a JSON-Schema object descriptor:
/// `{"type": "object", "properties": {...}, "required": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Names listed under `required`, in schema order.
    pub fn required(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }
}

/// A validated request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call ID, matching the model's tool call id
    pub id: String,

    pub name: String,

    /// Parsed arguments (always a JSON value, `{}` when the model sent none)
    pub arguments: serde_json::Value,
}

/// The result of one tool execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Chat/user/folder ids the call touched
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_entity_ids: Vec<String>,
}

impl ToolOutcome {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_affected(mut self, ids: impl IntoIterator<Item = String>) -> Self {
        self.affected_entity_ids.extend(ids);
        self
    }

    /// Content for the `tool` message fed back to the model: the data on
    /// success, otherwise the error, JSON encoded.
    pub fn to_message_content(&self) -> String {
        let value = match (&self.data, &self.error) {
            (Some(data), _) if !data.is_null() => data.clone(),
            (_, Some(err)) => serde_json::Value::String(err.clone()),
            _ => serde_json::Value::Null,
        };
        value.to_string()
    }
}

impl From<ToolError> for ToolOutcome {
    fn from(err: ToolError) -> Self {
        ToolOutcome::failed(err.to_string())
    }
}

/// Executes tool calls against the host application.
///
/// The engine treats this as opaque: it validates and classifies calls
/// before they arrive here, and records whatever comes back.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, call: &ToolCall) -> std::result::Result<ToolOutcome, ToolError>;
}

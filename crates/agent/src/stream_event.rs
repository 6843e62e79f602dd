//! Events a run streams to its caller.
//!
//! The CLI prints them; any other front end can forward them as JSON.

use serde::{Deserialize, Serialize};

use crate::ledger::ConfirmationRequest;

/// Events emitted during a run, in order:
/// - `thinking`              indicator on/off, with an optional step label
/// - `chunk`                 answer text
/// - `reasoning`             reasoning text
/// - `tool_call`             a call is about to be dispatched
/// - `tool_result`           a dispatched call finished
/// - `confirmation_required` a batch is held for approval (terminal)
/// - `done`                  final answer reached (terminal)
/// - `error`                 the run failed (terminal)
/// - `aborted`               the run was cancelled (terminal)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    Thinking {
        active: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        step: Option<String>,
    },

    Chunk { content: String },

    Reasoning {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },

    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    ConfirmationRequired { request: ConfirmationRequest },

    Done {
        run_id: String,
        iterations: u32,
        tool_calls_made: usize,
    },

    Error { message: String },

    Aborted { run_id: String },
}

impl AgentStreamEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Thinking { .. } => "thinking",
            Self::Chunk { .. } => "chunk",
            Self::Reasoning { .. } => "reasoning",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::ConfirmationRequired { .. } => "confirmation_required",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
            Self::Aborted { .. } => "aborted",
        }
    }

    /// Whether no event follows this one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ConfirmationRequired { .. } | Self::Done { .. } | Self::Error { .. } | Self::Aborted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_chunk() {
        let event = AgentStreamEvent::Chunk {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"chunk""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn thinking_omits_missing_step() {
        let json = serde_json::to_string(&AgentStreamEvent::Thinking {
            active: true,
            step: None,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"thinking","active":true}"#);
    }

    #[test]
    fn event_serialization_tool_call() {
        let event = AgentStreamEvent::ToolCall {
            id: "call_1".into(),
            name: "pinChat".into(),
            input: serde_json::json!({"chatId": "7"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));
        assert!(json.contains(r#""name":"pinChat""#));
    }

    #[test]
    fn terminal_events() {
        assert!(AgentStreamEvent::Error {
            message: "boom".into()
        }
        .is_terminal());
        assert!(AgentStreamEvent::Aborted { run_id: "r".into() }.is_terminal());
        assert!(!AgentStreamEvent::Chunk {
            content: "x".into()
        }
        .is_terminal());
        assert_eq!(
            AgentStreamEvent::Done {
                run_id: "r".into(),
                iterations: 1,
                tool_calls_made: 0
            }
            .event_type(),
            "done"
        );
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"reasoning","content":"hmm","title":"Scanning"}"#;
        let event: AgentStreamEvent = serde_json::from_str(json).unwrap();
        match event {
            AgentStreamEvent::Reasoning { content, title } => {
                assert_eq!(content, "hmm");
                assert_eq!(title.as_deref(), Some("Scanning"));
            }
            _ => panic!("Wrong variant"),
        }
    }
}

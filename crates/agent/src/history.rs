//! Repair of caller-supplied conversation history.
//!
//! Providers reject a transcript where an assistant tool call has no
//! answering tool message. Prior turns can end up that way when a run was
//! aborted or paused mid-batch.

use std::collections::HashSet;
use toolgate_core::{Message, Role};
use tracing::warn;

/// Return `messages` with unanswered tool calls stripped and orphan tool
/// messages dropped.
///
/// An assistant message keeps its tool calls only when every call id is
/// answered by the run of tool messages directly after it.
pub fn validate_conversation_history(messages: &[Message]) -> Vec<Message> {
    let mut result = Vec::with_capacity(messages.len());
    let mut i = 0;

    while i < messages.len() {
        let msg = &messages[i];

        match msg.role {
            Role::Assistant if !msg.tool_calls.is_empty() => {
                let mut end = i + 1;
                while end < messages.len() && messages[end].role == Role::Tool {
                    end += 1;
                }
                let answered: HashSet<&str> = messages[i + 1..end]
                    .iter()
                    .filter_map(|m| m.tool_call_id.as_deref())
                    .collect();

                if msg.tool_calls.iter().all(|tc| answered.contains(tc.id.as_str())) {
                    result.extend_from_slice(&messages[i..end]);
                } else {
                    warn!(message_id = %msg.id, "Removing incomplete tool calls from history");
                    let mut stripped = msg.clone();
                    stripped.tool_calls.clear();
                    result.push(stripped);
                    // The partial answers would now be orphans
                }
                i = end;
            }
            Role::Tool => {
                warn!(message_id = %msg.id, "Skipping orphan tool result");
                i += 1;
            }
            _ => {
                result.push(msg.clone());
                i += 1;
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolgate_core::MessageToolCall;

    fn assistant_calling(ids: &[&str]) -> Message {
        Message::assistant("working on it").with_tool_calls(
            ids.iter()
                .map(|id| MessageToolCall {
                    id: id.to_string(),
                    name: "pinChat".into(),
                    arguments: "{}".into(),
                })
                .collect(),
        )
    }

    fn roles(messages: &[Message]) -> Vec<Role> {
        messages.iter().map(|m| m.role).collect()
    }

    #[test]
    fn complete_turns_pass_through() {
        let history = vec![
            Message::user("pin chats 1 and 2"),
            assistant_calling(&["a", "b"]),
            Message::tool_result("a", "{}"),
            Message::tool_result("b", "{}"),
            Message::assistant("Done."),
        ];
        let repaired = validate_conversation_history(&history);
        assert_eq!(repaired.len(), 5);
        assert_eq!(repaired[1].tool_calls.len(), 2);
    }

    #[test]
    fn unanswered_calls_are_stripped() {
        let history = vec![
            Message::user("pin chats 1 and 2"),
            assistant_calling(&["a", "b"]),
            Message::tool_result("a", "{}"),
            Message::user("never mind"),
        ];
        let repaired = validate_conversation_history(&history);
        assert_eq!(roles(&repaired), vec![Role::User, Role::Assistant, Role::User]);
        assert!(repaired[1].tool_calls.is_empty());
        assert_eq!(repaired[1].content, "working on it");
    }

    #[test]
    fn orphan_tool_messages_are_dropped() {
        let history = vec![
            Message::tool_result("x", "{}"),
            Message::user("hello"),
            Message::tool_result("y", "{}"),
        ];
        let repaired = validate_conversation_history(&history);
        assert_eq!(roles(&repaired), vec![Role::User]);
    }
}

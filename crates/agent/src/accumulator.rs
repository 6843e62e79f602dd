//! Tool-call accumulation and validation for one assistant turn.

use std::collections::BTreeMap;
use toolgate_core::{MessageToolCall, StreamDelta, ToolCall};
use tracing::warn;

/// Collects tool-call fragments keyed by the provider-assigned index.
///
/// Fragments append to the entry at their index; a final
/// [`StreamDelta::ToolCall`] replaces it outright.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    calls: BTreeMap<u32, MessageToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one delta in. Returns `true` when the delta opened a new index
    /// or named a call for the first time.
    pub fn apply(&mut self, delta: &StreamDelta) -> bool {
        match delta {
            StreamDelta::ToolCallFragment {
                index,
                id,
                name,
                arguments,
            } => {
                let is_new = !self.calls.contains_key(index);
                let entry = self.calls.entry(*index).or_insert_with(|| MessageToolCall {
                    id: String::new(),
                    name: String::new(),
                    arguments: String::new(),
                });
                if let Some(id) = id.as_deref().filter(|id| !id.is_empty()) {
                    entry.id = id.to_string();
                }
                let mut named = false;
                if let Some(name) = name.as_deref().filter(|n| !n.is_empty()) {
                    named = entry.name.is_empty();
                    entry.name = name.to_string();
                }
                if let Some(fragment) = arguments {
                    entry.arguments.push_str(fragment);
                }
                is_new || named
            }
            StreamDelta::ToolCall { index, call } => {
                let known = self
                    .calls
                    .get(index)
                    .is_some_and(|c| c.name == call.name);
                self.calls.insert(*index, call.clone());
                !known
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Name of the call at the lowest index, if it has one yet.
    pub fn first_name(&self) -> Option<&str> {
        self.calls
            .values()
            .next()
            .map(|c| c.name.as_str())
            .filter(|n| !n.is_empty())
    }

    /// The raw calls in index order.
    pub fn raw(&self) -> Vec<MessageToolCall> {
        self.calls.values().cloned().collect()
    }
}

/// Keep the calls that can be dispatched: an id, a name, and arguments
/// that parse as JSON (empty arguments read as `{}`). Everything else is
/// logged and dropped.
pub fn validate_tool_calls(raw: &[MessageToolCall]) -> Vec<ToolCall> {
    raw.iter()
        .filter_map(|call| {
            if call.id.is_empty() || call.name.is_empty() {
                warn!(id = %call.id, name = %call.name, "Dropping tool call without id or name");
                return None;
            }
            let arguments = if call.arguments.trim().is_empty() {
                "{}"
            } else {
                call.arguments.as_str()
            };
            match serde_json::from_str(arguments) {
                Ok(arguments) => Some(ToolCall {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    arguments,
                }),
                Err(e) => {
                    warn!(
                        tool = %call.name,
                        arguments = %call.arguments,
                        error = %e,
                        "Dropping tool call with invalid arguments"
                    );
                    None
                }
            }
        })
        .collect()
}

/// The form a validated call takes inside an assistant message.
pub fn to_message_call(call: &ToolCall) -> MessageToolCall {
    MessageToolCall {
        id: call.id.clone(),
        name: call.name.clone(),
        arguments: call.arguments.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fragment(index: u32, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> StreamDelta {
        StreamDelta::ToolCallFragment {
            index,
            id: id.map(String::from),
            name: name.map(String::from),
            arguments: args.map(String::from),
        }
    }

    #[test]
    fn fragments_assemble_into_one_call() {
        let mut acc = ToolCallAccumulator::new();
        assert!(acc.apply(&fragment(0, Some("call_1"), Some("sendMessage"), Some("{\"chat"))));
        assert!(!acc.apply(&fragment(0, None, None, Some("Id\":\"42\",\"te"))));
        assert!(!acc.apply(&fragment(0, None, None, Some("xt\":\"hi\"}"))));

        let calls = validate_tool_calls(&acc.raw());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "sendMessage");
        assert_eq!(calls[0].arguments, json!({"chatId": "42", "text": "hi"}));
    }

    #[test]
    fn late_name_counts_as_new() {
        let mut acc = ToolCallAccumulator::new();
        assert!(acc.apply(&fragment(0, Some("call_1"), None, None)));
        assert_eq!(acc.first_name(), None);
        assert!(acc.apply(&fragment(0, None, Some("pinChat"), Some("{}"))));
        assert_eq!(acc.first_name(), Some("pinChat"));
    }

    #[test]
    fn final_call_replaces_fragments() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(&fragment(0, Some("call_1"), Some("pinChat"), Some("{\"chatId\":")));
        acc.apply(&StreamDelta::ToolCall {
            index: 0,
            call: MessageToolCall {
                id: "call_1".into(),
                name: "pinChat".into(),
                arguments: "{\"chatId\":\"7\"}".into(),
            },
        });
        assert_eq!(acc.len(), 1);
        assert_eq!(acc.raw()[0].arguments, "{\"chatId\":\"7\"}");
    }

    #[test]
    fn invalid_arguments_drop_only_that_call() {
        let raw = vec![
            MessageToolCall {
                id: "a".into(),
                name: "pinChat".into(),
                arguments: "{\"chatId\":\"1\"}".into(),
            },
            MessageToolCall {
                id: "b".into(),
                name: "archiveChat".into(),
                arguments: "{\"chatId\":".into(),
            },
            MessageToolCall {
                id: "c".into(),
                name: "listChats".into(),
                arguments: String::new(),
            },
            MessageToolCall {
                id: String::new(),
                name: "listFolders".into(),
                arguments: "{}".into(),
            },
        ];
        let calls = validate_tool_calls(&raw);
        let ids: Vec<_> = calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(calls[1].arguments, json!({}));

        // Pure: same input, same output
        assert_eq!(validate_tool_calls(&raw), calls);
    }

    #[test]
    fn raw_is_in_index_order() {
        let mut acc = ToolCallAccumulator::new();
        acc.apply(&fragment(2, Some("c"), Some("muteChat"), Some("{}")));
        acc.apply(&fragment(0, Some("a"), Some("pinChat"), Some("{}")));
        let ids: Vec<_> = acc.raw().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }
}

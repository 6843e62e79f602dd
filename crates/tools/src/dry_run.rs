//! A [`ToolHandler`] that performs nothing and echoes each call back.
//!
//! Used by the CLI and the bridge when no host data layer is attached.

use async_trait::async_trait;
use serde_json::{Value, json};
use toolgate_core::{ToolCall, ToolError, ToolHandler, ToolOutcome};

#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunHandler;

#[async_trait]
impl ToolHandler for DryRunHandler {
    async fn call(&self, call: &ToolCall) -> Result<ToolOutcome, ToolError> {
        tracing::info!(tool = %call.name, args = %call.arguments, "Dry run");
        let affected = affected_ids(&call.arguments);
        Ok(ToolOutcome::ok(json!({
            "dryRun": true,
            "tool": call.name,
            "args": call.arguments,
        }))
        .with_affected(affected))
    }
}

/// Ids from `chatId` and `chatIds`; numbers are rendered as strings.
fn affected_ids(args: &Value) -> Vec<String> {
    let as_id = |v: &Value| match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    };
    let mut ids: Vec<String> = args.get("chatId").and_then(as_id).into_iter().collect();
    if let Some(list) = args.get("chatIds").and_then(Value::as_array) {
        ids.extend(list.iter().filter_map(as_id));
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_call_and_reports_chats() {
        let call = ToolCall {
            id: "c1".into(),
            name: "batchArchive".into(),
            arguments: json!({"chatIds": ["10", 11, ""]}),
        };
        let outcome = DryRunHandler.call(&call).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.data.as_ref().unwrap()["tool"], "batchArchive");
        assert_eq!(outcome.affected_entity_ids, vec!["10", "11"]);
    }

    #[tokio::test]
    async fn no_chat_arguments_means_no_affected_ids() {
        let call = ToolCall {
            id: "c2".into(),
            name: "listFolders".into(),
            arguments: json!({}),
        };
        let outcome = DryRunHandler.call(&call).await.unwrap();
        assert!(outcome.affected_entity_ids.is_empty());
    }
}

//! Anthropic Messages API adapter.
//!
//! - `x-api-key` header authentication (not Bearer)
//! - System prompt as a top-level field
//! - Tool results sent back as user `tool_result` blocks
//! - Tool input streamed as `input_json_delta` per content block index

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use toolgate_core::{
    Credential, DeltaReceiver, Message, MessageToolCall, Provider, ProviderError, ProviderRequest,
    Role, StreamDelta, ToolDefinition,
};
use tracing::debug;

use crate::http::{build_client, check_status};
use crate::sse::{Frame, FrameDecoder, spawn_pump};
use crate::DEFAULT_IDLE_TIMEOUT;

const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    base_url: String,
    default_model: String,
    idle_timeout: Duration,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new() -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: ANTHROPIC_BASE_URL.into(),
            default_model: DEFAULT_MODEL.into(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            client: build_client()?,
        })
    }

    /// Create with a custom base URL (e.g., for proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    fn request_body(&self, request: &ProviderRequest) -> serde_json::Value {
        let (system, messages) = extract_system(&request.messages);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": to_api_messages(&messages),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
            "stream": true,
        });

        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(to_api_tools(&request.tools));
        }

        body
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn stream_chat(
        &self,
        credential: &Credential,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> Result<DeltaReceiver, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.request_body(&request);

        debug!(provider = "anthropic", model = %request.model, "Sending streaming request");

        let send = self
            .client
            .post(&url)
            .header("x-api-key", credential.expose())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ProviderError::StreamInterrupted("cancelled before response".into()));
            }
            response = send => response.map_err(|e| ProviderError::Network(e.to_string()))?,
        };

        let response =
            check_status("anthropic", response, |status| format!("Anthropic error: {status}"))
                .await?;

        Ok(spawn_pump(
            "anthropic",
            response.bytes_stream(),
            AnthropicDecoder::default(),
            self.idle_timeout,
            cancel,
        ))
    }
}

/// Split system messages out; Anthropic takes them as a top-level field.
fn extract_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
    let (system, rest): (Vec<&Message>, Vec<&Message>) =
        messages.iter().partition(|m| m.role == Role::System);
    let system = (!system.is_empty()).then(|| {
        system
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    });
    (system, rest)
}

/// Convert messages to content blocks. Consecutive tool results are merged
/// into one user turn, as the API requires all results for an assistant
/// turn to arrive together.
fn to_api_messages(messages: &[&Message]) -> Vec<AnthropicMessage> {
    let mut result: Vec<AnthropicMessage> = Vec::new();

    for msg in messages {
        match msg.role {
            Role::User => result.push(AnthropicMessage {
                role: "user".into(),
                content: AnthropicContent::Text(msg.content.clone()),
            }),
            Role::Assistant if msg.tool_calls.is_empty() => result.push(AnthropicMessage {
                role: "assistant".into(),
                content: AnthropicContent::Text(msg.content.clone()),
            }),
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !msg.content.is_empty() {
                    blocks.push(ContentBlock::Text {
                        text: msg.content.clone(),
                    });
                }
                for tc in &msg.tool_calls {
                    blocks.push(ContentBlock::ToolUse {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        input: serde_json::from_str(&tc.arguments)
                            .unwrap_or_else(|_| serde_json::json!({})),
                    });
                }
                result.push(AnthropicMessage {
                    role: "assistant".into(),
                    content: AnthropicContent::Blocks(blocks),
                });
            }
            Role::Tool => {
                let block = ContentBlock::ToolResult {
                    tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                    content: msg.content.clone(),
                };
                if let Some(AnthropicMessage {
                    role,
                    content: AnthropicContent::Blocks(blocks),
                }) = result.last_mut()
                    && role == "user"
                    && blocks
                        .iter()
                        .all(|b| matches!(b, ContentBlock::ToolResult { .. }))
                {
                    blocks.push(block);
                } else {
                    result.push(AnthropicMessage {
                        role: "user".into(),
                        content: AnthropicContent::Blocks(vec![block]),
                    });
                }
            }
            Role::System => {}
        }
    }

    result
}

fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
    tools
        .iter()
        .map(|t| AnthropicTool {
            name: t.name.clone(),
            description: t.description.clone(),
            input_schema: t.parameters.clone(),
        })
        .collect()
}

/// Tracks open `tool_use` blocks by content block index.
#[derive(Default)]
pub(crate) struct AnthropicDecoder {
    open: BTreeMap<u32, MessageToolCall>,
}

impl AnthropicDecoder {
    fn close(index: u32, mut call: MessageToolCall) -> StreamDelta {
        if call.arguments.trim().is_empty() {
            call.arguments = "{}".into();
        }
        StreamDelta::ToolCall { index, call }
    }
}

impl FrameDecoder for AnthropicDecoder {
    fn decode(&mut self, data: &str) -> Result<Frame, serde_json::Error> {
        let event: StreamEvent = serde_json::from_str(data)?;
        let mut deltas = Vec::new();

        match event {
            StreamEvent::ContentBlockStart {
                index,
                content_block: StartBlock::ToolUse { id, name },
            } => {
                self.open.insert(
                    index,
                    MessageToolCall {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: String::new(),
                    },
                );
                deltas.push(StreamDelta::ToolCallFragment {
                    index,
                    id: Some(id),
                    name: Some(name),
                    arguments: None,
                });
            }
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                BlockDelta::TextDelta { text } if !text.is_empty() => {
                    deltas.push(StreamDelta::Content { text });
                }
                BlockDelta::ThinkingDelta { thinking } if !thinking.is_empty() => {
                    deltas.push(StreamDelta::Reasoning {
                        text: thinking,
                        title: None,
                    });
                }
                BlockDelta::InputJsonDelta { partial_json } => {
                    if let Some(call) = self.open.get_mut(&index) {
                        call.arguments.push_str(&partial_json);
                    }
                    deltas.push(StreamDelta::ToolCallFragment {
                        index,
                        id: None,
                        name: None,
                        arguments: Some(partial_json),
                    });
                }
                _ => {}
            },
            StreamEvent::ContentBlockStop { index } => {
                if let Some(call) = self.open.remove(&index) {
                    deltas.push(Self::close(index, call));
                }
            }
            StreamEvent::MessageStop => {
                return Ok(Frame {
                    deltas,
                    finished: true,
                });
            }
            StreamEvent::Error { error } => {
                deltas.push(StreamDelta::Error {
                    message: error.message,
                });
            }
            _ => {}
        }

        Ok(Frame::with(deltas))
    }

    fn flush(&mut self) -> Vec<StreamDelta> {
        std::mem::take(&mut self.open)
            .into_iter()
            .map(|(index, call)| Self::close(index, call))
            .collect()
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockStart {
        index: u32,
        content_block: StartBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageStop,
    Error {
        error: StreamErrorBody,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StartBlock {
    ToolUse {
        id: String,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamErrorBody {
    message: String,
}

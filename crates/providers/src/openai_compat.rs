//! OpenAI-compatible chat completions adapter.
//!
//! Serves OpenRouter and OpenAI, which share the `/chat/completions` SSE
//! frame shape: `choices[0].delta` carries content, reasoning and indexed
//! tool-call fragments, and `data: [DONE]` ends the stream.

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

use crate::http::{build_client, check_status, reasoning_title};
use crate::sse::{Frame, FrameDecoder, spawn_pump};
use crate::DEFAULT_IDLE_TIMEOUT;

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// An OpenAI-compatible streaming provider.
pub struct OpenAiCompatProvider {
    name: String,
    /// Human-facing backend name used in fallback error messages
    label: String,
    base_url: String,
    default_model: String,
    /// Ask for reasoning output on Gemini-family models
    gemini_reasoning: bool,
    idle_timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let name = name.into();
        Ok(Self {
            label: name.clone(),
            name,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            default_model: default_model.into(),
            gemini_reasoning: false,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            client: build_client()?,
        })
    }

    /// OpenRouter, the default backend.
    pub fn openrouter() -> Result<Self, ProviderError> {
        let mut provider = Self::new("openrouter", OPENROUTER_BASE_URL, "anthropic/claude-sonnet-4")?;
        provider.label = "OpenRouter".into();
        provider.gemini_reasoning = true;
        Ok(provider)
    }

    pub fn openai() -> Result<Self, ProviderError> {
        let mut provider = Self::new("openai", OPENAI_BASE_URL, "gpt-5.2")?;
        provider.label = "OpenAI".into();
        Ok(provider)
    }

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
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": true,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(to_api_tools(&request.tools));
            body["tool_choice"] = serde_json::json!("auto");
        }

        if self.gemini_reasoning && request.model.contains("gemini") {
            body["include"] = serde_json::json!(["reasoning"]);
        }

        body
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
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
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(&request);

        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending streaming request"
        );

        let send = self
            .client
            .post(&url)
            .bearer_auth(credential.expose())
            .header("Accept", "text/event-stream")
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ProviderError::StreamInterrupted("cancelled before response".into()));
            }
            response = send => response.map_err(|e| ProviderError::Network(e.to_string()))?,
        };

        let label = self.label.clone();
        let response =
            check_status(&self.name, response, |status| format!("{label} error: {status}")).await?;

        Ok(spawn_pump(
            &self.name,
            response.bytes_stream(),
            OpenAiDecoder::default(),
            self.idle_timeout,
            cancel,
        ))
    }
}

/// Convert transcript messages to the chat completions shape.
fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
    messages
        .iter()
        .map(|m| ApiMessage {
            role: match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
                Role::Tool => "tool",
            }
            .into(),
            content: Some(m.content.clone()),
            tool_calls: (!m.tool_calls.is_empty()).then(|| {
                m.tool_calls
                    .iter()
                    .map(|tc| ApiToolCall {
                        id: tc.id.clone(),
                        r#type: "function".into(),
                        function: ApiFunction {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: m.tool_call_id.clone(),
        })
        .collect()
}

fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
    tools
        .iter()
        .map(|t| ApiToolDefinition {
            r#type: "function".into(),
            function: ApiToolFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            },
        })
        .collect()
}

/// Decodes chat completion chunks, keeping the running state of every
/// tool call by index so it can be flushed whole at `[DONE]`.
#[derive(Default)]
pub(crate) struct OpenAiDecoder {
    calls: BTreeMap<u32, MessageToolCall>,
}

impl FrameDecoder for OpenAiDecoder {
    fn decode(&mut self, data: &str) -> Result<Frame, serde_json::Error> {
        if data == "[DONE]" {
            return Ok(Frame::finished());
        }

        let chunk: StreamResponse = serde_json::from_str(data)?;
        let mut deltas = Vec::new();

        if let Some(error) = chunk.error {
            deltas.push(StreamDelta::Error {
                message: error.message.unwrap_or_else(|| "Unknown streaming error".into()),
            });
            return Ok(Frame::with(deltas));
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return Ok(Frame::default());
        };
        let delta = choice.delta;

        if let Some(reasoning) = delta.reasoning.filter(|r| !r.is_empty()) {
            deltas.push(StreamDelta::Reasoning {
                title: reasoning_title(&reasoning),
                text: reasoning,
            });
        }

        if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
            deltas.push(StreamDelta::Content { text: content });
        }

        for tc in delta.tool_calls.unwrap_or_default() {
            let (name, arguments) = match tc.function {
                Some(f) => (f.name, f.arguments),
                None => (None, None),
            };
            let entry = self.calls.entry(tc.index).or_insert_with(|| MessageToolCall {
                id: String::new(),
                name: String::new(),
                arguments: String::new(),
            });
            if let Some(id) = tc.id.as_ref().filter(|id| !id.is_empty()) {
                entry.id = id.clone();
            }
            if let Some(name) = name.as_ref().filter(|n| !n.is_empty()) {
                entry.name = name.clone();
            }
            if let Some(args) = &arguments {
                entry.arguments.push_str(args);
            }
            deltas.push(StreamDelta::ToolCallFragment {
                index: tc.index,
                id: tc.id,
                name,
                arguments,
            });
        }

        Ok(Frame::with(deltas))
    }

    fn flush(&mut self) -> Vec<StreamDelta> {
        std::mem::take(&mut self.calls)
            .into_iter()
            .map(|(index, call)| StreamDelta::ToolCall { index, call })
            .collect()
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta; arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

//! Google Gemini `streamGenerateContent` adapter.
//!
//! Gemini never streams partial calls: each `functionCall` part arrives
//! whole, so the decoder emits final tool calls directly and has nothing to
//! flush. Call ids are generated (`call_<n>_<turn>`) since the API assigns
//! none; the turn suffix keeps them unique across a multi-turn run.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use toolgate_core::{
    Credential, DeltaReceiver, Message, MessageToolCall, Provider, ProviderError, ProviderRequest,
    Role, StreamDelta, ToolDefinition,
};
use tracing::debug;
use uuid::Uuid;

use crate::http::{build_client, check_status};
use crate::sse::{Frame, FrameDecoder, spawn_pump};
use crate::DEFAULT_IDLE_TIMEOUT;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_MAX_TOKENS: u32 = 8192;

pub struct GeminiProvider {
    base_url: String,
    default_model: String,
    idle_timeout: Duration,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new() -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: GEMINI_BASE_URL.into(),
            default_model: DEFAULT_MODEL.into(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            client: build_client()?,
        })
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

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{model}:streamGenerateContent?alt=sse",
            self.base_url
        )
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let system: Vec<&str> = request
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();

        let mut body = serde_json::json!({
            "contents": to_contents(&request.messages),
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            },
        });

        if !system.is_empty() {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{"text": system.join("\n\n")}]
            });
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!([{
                "functionDeclarations": to_declarations(&request.tools)
            }]);
        }

        body
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
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
        let url = self.endpoint(&request.model);
        let body = Self::request_body(&request);

        debug!(provider = "gemini", model = %request.model, "Sending streaming request");

        let send = self
            .client
            .post(&url)
            .query(&[("key", credential.expose())])
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(ProviderError::StreamInterrupted("cancelled before response".into()));
            }
            response = send => response.map_err(|e| ProviderError::Network(e.to_string()))?,
        };

        let response =
            check_status("gemini", response, |status| format!("Gemini error: {status}")).await?;

        Ok(spawn_pump(
            "gemini",
            response.bytes_stream(),
            GeminiDecoder::new(),
            self.idle_timeout,
            cancel,
        ))
    }
}

/// Convert the transcript to `contents`. Tool results become `function`
/// turns; the function name is recovered from the assistant call that
/// carried the same id.
fn to_contents(messages: &[Message]) -> Vec<serde_json::Value> {
    let mut names: HashMap<&str, &str> = HashMap::new();
    let mut contents = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {}
            Role::User => contents.push(serde_json::json!({
                "role": "user",
                "parts": [{"text": msg.content}],
            })),
            Role::Assistant => {
                let mut parts = Vec::new();
                if !msg.content.is_empty() {
                    parts.push(serde_json::json!({"text": msg.content}));
                }
                for tc in &msg.tool_calls {
                    names.insert(tc.id.as_str(), tc.name.as_str());
                    let args: serde_json::Value = serde_json::from_str(&tc.arguments)
                        .unwrap_or_else(|_| serde_json::json!({}));
                    parts.push(serde_json::json!({
                        "functionCall": {"name": tc.name, "args": args}
                    }));
                }
                if !parts.is_empty() {
                    contents.push(serde_json::json!({"role": "model", "parts": parts}));
                }
            }
            Role::Tool => {
                let name = msg
                    .tool_call_id
                    .as_deref()
                    .and_then(|id| names.get(id))
                    .copied()
                    .unwrap_or_default();
                let response: serde_json::Value = serde_json::from_str(&msg.content)
                    .unwrap_or_else(|_| serde_json::Value::String(msg.content.clone()));
                contents.push(serde_json::json!({
                    "role": "function",
                    "parts": [{
                        "functionResponse": {"name": name, "response": {"content": response}}
                    }],
                }));
            }
        }
    }

    contents
}

fn to_declarations(tools: &[ToolDefinition]) -> Vec<serde_json::Value> {
    tools
        .iter()
        .map(|t| {
            serde_json::json!({
                "name": t.name,
                "description": t.description,
                "parameters": t.parameters,
            })
        })
        .collect()
}

pub(crate) struct GeminiDecoder {
    next_call: u32,
    turn: String,
}

impl GeminiDecoder {
    pub(crate) fn new() -> Self {
        let mut turn = Uuid::new_v4().simple().to_string();
        turn.truncate(8);
        Self { next_call: 0, turn }
    }
}

impl FrameDecoder for GeminiDecoder {
    fn decode(&mut self, data: &str) -> Result<Frame, serde_json::Error> {
        let chunk: GenerateResponse = serde_json::from_str(data)?;
        let mut deltas = Vec::new();

        if let Some(error) = chunk.error {
            deltas.push(StreamDelta::Error {
                message: error.message,
            });
            return Ok(Frame::with(deltas));
        }

        let Some(candidate) = chunk.candidates.into_iter().next() else {
            return Ok(Frame::default());
        };

        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(call) = part.function_call {
                let index = self.next_call;
                self.next_call += 1;
                deltas.push(StreamDelta::ToolCall {
                    index,
                    call: MessageToolCall {
                        id: format!("call_{index}_{}", self.turn),
                        name: call.name,
                        arguments: call.args.unwrap_or_else(|| serde_json::json!({})).to_string(),
                    },
                });
            } else if let Some(text) = part.text.filter(|t| !t.is_empty()) {
                if part.thought {
                    deltas.push(StreamDelta::Reasoning { text, title: None });
                } else {
                    deltas.push(StreamDelta::Content { text });
                }
            }
        }

        Ok(Frame {
            deltas,
            finished: candidate.finish_reason.is_some(),
        })
    }

    fn flush(&mut self) -> Vec<StreamDelta> {
        Vec::new()
    }
}

// --- Gemini API types ---

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

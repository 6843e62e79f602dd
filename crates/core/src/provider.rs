//! Provider trait — the abstraction over streaming inference backends.
//!
//! Every backend speaks its own wire format; each adapter normalizes that
//! format into a channel of [`StreamDelta`]s. The agent loop only ever pulls
//! from that channel, so it never needs to know which backend answered.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::message::{Message, MessageToolCall};
use crate::tool::ToolDefinition;

/// A bearer credential for one inference backend.
///
/// Never printed: `Debug` is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw secret, for building auth headers.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// One streaming chat request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "anthropic/claude-sonnet-4")
    pub model: String,

    /// The full transcript, system message first
    pub messages: Vec<Message>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

/// One normalized unit of streamed model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamDelta {
    /// Answer text.
    Content { text: String },

    /// Reasoning text. `title` is the bolded heading some models prefix.
    Reasoning {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },

    /// A partial tool call keyed by the provider-assigned index.
    ToolCallFragment {
        index: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        arguments: Option<String>,
    },

    /// A completed tool call, flushed at the terminal signal.
    ToolCall { index: u32, call: MessageToolCall },

    /// An error object reported inside the stream.
    Error { message: String },

    /// The stream finished.
    Done,
}

impl StreamDelta {
    pub fn content(text: impl Into<String>) -> Self {
        Self::Content { text: text.into() }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// Receiving half of a provider stream.
pub type DeltaReceiver = mpsc::Receiver<std::result::Result<StreamDelta, ProviderError>>;

/// The core Provider trait.
///
/// Implementations spawn a reader task and hand back the receiving end of a
/// channel. Guarantees every implementation upholds:
///
/// - malformed frames are dropped, never surfaced as errors;
/// - buffered tool-call fragments are flushed as [`StreamDelta::ToolCall`]
///   before [`StreamDelta::Done`];
/// - when `cancel` fires the reader stops and sends nothing further;
/// - an idle gap longer than the adapter's watchdog yields
///   [`ProviderError::Timeout`] and ends the stream.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A short identifier (e.g., "openrouter", "anthropic").
    fn name(&self) -> &str;

    /// The model used when the caller does not pick one.
    fn default_model(&self) -> &str;

    /// Open a streaming chat call.
    async fn stream_chat(
        &self,
        credential: &Credential,
        request: ProviderRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<DeltaReceiver, ProviderError>;
}

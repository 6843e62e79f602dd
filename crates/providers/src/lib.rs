//! Streaming inference adapters for Toolgate.
//!
//! Every adapter implements [`toolgate_core::Provider`] on top of the shared
//! SSE pump in [`sse`], so they differ only in request and frame shape.
//! The router builds them from configuration.

pub mod anthropic;
pub mod gemini;
mod http;
pub mod openai_compat;
pub mod router;
pub mod sse;

use std::time::Duration;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderKind, ProviderRouter, build_from_config};

/// Idle watchdog used when none is configured.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

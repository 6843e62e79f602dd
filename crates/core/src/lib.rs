//! # Toolgate Core
//!
//! Domain types, traits, and error definitions for the Toolgate tool-calling
//! agent engine. This crate carries **no HTTP or runtime wiring**: it defines
//! the model every other crate implements against.
//!
//! ## Seams
//!
//! - [`Provider`]: one streaming inference backend, normalized into
//!   [`StreamDelta`]s.
//! - [`ToolHandler`]: the opaque host-side executor for tool calls.
//! - [`EventBus`]: broadcast of domain events for optional observers.

pub mod error;
pub mod event;
pub mod message;
pub mod mode;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{AgentError, Error, ProviderError, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, MessageToolCall, Role};
pub use mode::AgentMode;
pub use provider::{Credential, DeltaReceiver, Provider, ProviderRequest, StreamDelta};
pub use tool::{ToolCall, ToolDefinition, ToolHandler, ToolOutcome};

//! Error types for the Toolgate domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Toolgate operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Agent loop errors ---
    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error came from the provider idle watchdog.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Provider(e) if e.is_timeout())
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Stream timeout: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout(_))
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    NotFound(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("{0}")]
    RateLimited(String),

    #[error("Tool \"{tool_name}\" is not available in {mode} mode. Only read-only operations are allowed.")]
    NotAllowed { tool_name: String, mode: String },
}

#[derive(Debug, Clone, Error)]
pub enum AgentError {
    #[error("Maximum iterations ({max}) reached without a final answer")]
    IterationLimit { max: u32 },

    #[error("No pending plan with id {0}")]
    PlanNotFound(String),

    #[error("Plan {plan_id} is {status}, expected awaiting_confirmation")]
    InvalidPlanState { plan_id: String, status: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn not_allowed_names_tool_and_mode() {
        let err = ToolError::NotAllowed {
            tool_name: "deleteChat".into(),
            mode: "ask".into(),
        };
        assert_eq!(
            err.to_string(),
            "Tool \"deleteChat\" is not available in ask mode. Only read-only operations are allowed."
        );
    }

    #[test]
    fn timeout_is_classified() {
        let err: Error = ProviderError::Timeout("no data received for 30 seconds".into()).into();
        assert!(err.is_timeout());
        assert!(err.to_string().contains("Stream timeout"));

        let other: Error = ProviderError::Network("reset".into()).into();
        assert!(!other.is_timeout());
    }

    #[test]
    fn iteration_limit_mentions_cap() {
        let err: Error = AgentError::IterationLimit { max: 100 }.into();
        assert!(err.to_string().contains("100"));
    }
}

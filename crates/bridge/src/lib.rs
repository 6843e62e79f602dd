//! Bridge: the tool registry behind a plain request/response protocol.
//!
//! External clients list tools and groups, and execute single calls. The
//! agent loop is not involved. Two transports share one [`BridgeHandler`]:
//! a WebSocket endpoint ([`server`]) and line-delimited stdio ([`stdio`]).

pub mod handler;
pub mod protocol;
pub mod server;
pub mod stdio;

pub use handler::BridgeHandler;
pub use protocol::{BridgeRequest, BridgeResponse, BridgeSkill, BridgeTool, ResponseKind};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Bridge I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

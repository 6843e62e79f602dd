//! Tool registry, mode policy and execution for Toolgate.
//!
//! The registry is the built-in messaging catalog (or a caller-supplied
//! one). The executor sits between the agent loop and the host
//! [`ToolHandler`](toolgate_core::ToolHandler), applying the call budget and
//! answering `useExtraTool` itself.

pub mod budget;
pub mod dry_run;
pub mod executor;
pub mod policy;
pub mod registry;

pub use budget::CallBudget;
pub use dry_run::DryRunHandler;
pub use executor::ToolExecutor;
pub use policy::{group_tools_for_mode, is_allowed_in_mode, tools_for_mode};
pub use registry::{
    ExtraToolGroup, RegistryBuilder, RegistryError, ToolRegistry, USE_EXTRA_TOOL,
};

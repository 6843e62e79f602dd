//! Agent modes.

use serde::{Deserialize, Serialize};

/// How much the agent may do on the user's behalf.
///
/// - `ask`: answer questions with read-only lookups.
/// - `plan`: look around read-only and describe what it would do.
/// - `agent`: act, with destructive calls held for confirmation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    Ask,
    Plan,
    #[default]
    Agent,
}

impl AgentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::Ask => "ask",
            AgentMode::Plan => "plan",
            AgentMode::Agent => "agent",
        }
    }

    /// Whether the mode is limited to read-only tools.
    pub fn is_read_only(&self) -> bool {
        !matches!(self, AgentMode::Agent)
    }
}

impl std::fmt::Display for AgentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ask" => Ok(AgentMode::Ask),
            "plan" => Ok(AgentMode::Plan),
            "agent" => Ok(AgentMode::Agent),
            other => Err(format!("unknown mode '{other}' (expected ask, plan or agent)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        assert_eq!("ASK".parse::<AgentMode>().unwrap(), AgentMode::Ask);
        assert_eq!(AgentMode::Plan.to_string(), "plan");
        assert!("yolo".parse::<AgentMode>().is_err());
    }

    #[test]
    fn only_agent_mode_writes() {
        assert!(AgentMode::Ask.is_read_only());
        assert!(AgentMode::Plan.is_read_only());
        assert!(!AgentMode::Agent.is_read_only());
    }
}

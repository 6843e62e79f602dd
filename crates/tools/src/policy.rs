//! Mode policy: which tools a mode shows to the model, and which it lets
//! through to the handler.
//!
//! The two sets differ in `plan` mode, which shows every core tool but only
//! dispatches read-only calls.

use toolgate_core::{AgentMode, ToolDefinition};

use crate::registry::{ExtraToolGroup, ToolRegistry, USE_EXTRA_TOOL};

/// Core tools visible to the model in `mode`.
pub fn tools_for_mode(registry: &ToolRegistry, mode: AgentMode) -> Vec<ToolDefinition> {
    match mode {
        AgentMode::Ask => registry.read_only_definitions(),
        AgentMode::Plan | AgentMode::Agent => registry.core_definitions().to_vec(),
    }
}

/// Tools from a loaded extra group that become visible in `mode`.
pub fn group_tools_for_mode(group: &ExtraToolGroup, mode: AgentMode) -> Vec<ToolDefinition> {
    if mode == AgentMode::Agent {
        return group.tools.clone();
    }
    group
        .tools
        .iter()
        .filter(|t| group.is_read_only(&t.name))
        .cloned()
        .collect()
}

/// Whether a call to `tool` may be dispatched in `mode`.
pub fn is_allowed_in_mode(registry: &ToolRegistry, tool: &str, mode: AgentMode) -> bool {
    if mode == AgentMode::Agent {
        return true;
    }
    if tool == USE_EXTRA_TOOL {
        return true;
    }
    match registry.group_for_tool(tool) {
        Some(group) => group.is_read_only(tool),
        None => registry.is_read_only(tool),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ToolRegistry {
        ToolRegistry::builtin().unwrap()
    }

    #[test]
    fn ask_mode_shows_only_read_only_tools() {
        let registry = registry();
        let tools = tools_for_mode(&registry, AgentMode::Ask);
        assert_eq!(tools.len(), 12);
        assert!(tools.iter().all(|t| registry.is_read_only(&t.name)));
    }

    #[test]
    fn plan_and_agent_show_all_core_tools() {
        let registry = registry();
        assert_eq!(tools_for_mode(&registry, AgentMode::Plan).len(), 37);
        assert_eq!(tools_for_mode(&registry, AgentMode::Agent).len(), 37);
    }

    #[test]
    fn agent_mode_allows_everything() {
        let registry = registry();
        assert!(is_allowed_in_mode(&registry, "deleteChat", AgentMode::Agent));
        assert!(is_allowed_in_mode(&registry, "createDeal", AgentMode::Agent));
    }

    #[test]
    fn read_only_modes_block_mutations() {
        let registry = registry();
        for mode in [AgentMode::Ask, AgentMode::Plan] {
            assert!(is_allowed_in_mode(&registry, "listChats", mode));
            assert!(is_allowed_in_mode(&registry, USE_EXTRA_TOOL, mode));
            assert!(is_allowed_in_mode(&registry, "searchEntities", mode));
            assert!(!is_allowed_in_mode(&registry, "sendMessage", mode));
            assert!(!is_allowed_in_mode(&registry, "createDeal", mode));
            assert!(!is_allowed_in_mode(&registry, "noSuchTool", mode));
        }
    }

    #[test]
    fn group_tools_filtered_outside_agent_mode() {
        let registry = registry();
        let crm = registry.extra_group("crm").unwrap();
        assert_eq!(group_tools_for_mode(crm, AgentMode::Agent).len(), 12);

        let names: Vec<_> = group_tools_for_mode(crm, AgentMode::Plan)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(
            names,
            vec!["getEntityDetails", "searchEntities", "getEntityProperties", "listIntegrations"]
        );
    }
}

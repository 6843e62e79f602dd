//! `toolgate tools` — list the tools a mode shows the model.

use toolgate_core::AgentMode;
use toolgate_tools::{ToolRegistry, USE_EXTRA_TOOL, is_allowed_in_mode, tools_for_mode};

pub fn run(mode: AgentMode) -> Result<(), Box<dyn std::error::Error>> {
    let registry = ToolRegistry::builtin()?;
    print!("{}", render(&registry, mode));
    Ok(())
}

/// One line per visible tool, then the loadable groups.
pub fn render(registry: &ToolRegistry, mode: AgentMode) -> String {
    let mut out = format!("Tools visible in {mode} mode:\n");
    for def in tools_for_mode(registry, mode) {
        out.push_str(&format!("  {:<24} {}\n", def.name, classify(registry, &def.name, mode)));
    }

    out.push_str(&format!("\nExtra groups (load with {USE_EXTRA_TOOL}):\n"));
    for group in registry.extra_groups() {
        out.push_str(&format!("  {:<24} {} tools  {}\n", group.name, group.tools.len(), group.description));
    }
    out
}

fn classify(registry: &ToolRegistry, name: &str, mode: AgentMode) -> String {
    let mut tags = Vec::new();
    if registry.is_read_only(name) {
        tags.push("read-only".to_string());
    }
    if registry.is_destructive(name) {
        tags.push("destructive".to_string());
    }
    if let Some(undo) = registry.undo_tool_for(name) {
        tags.push(format!("undo: {undo}"));
    }
    if !is_allowed_in_mode(registry, name, mode) {
        tags.push("proposal only".to_string());
    }
    tags.join(", ")
}

//! Tool registry: the catalog of invocable tools and their safety classes.
//!
//! The built-in catalog is embedded at compile time and parsed once. Every
//! lookup after construction is a pure read, so one registry is shared by
//! all runs behind an `Arc`.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use toolgate_core::ToolDefinition;

/// Name of the meta-tool that loads an extra tool group.
pub const USE_EXTRA_TOOL: &str = "useExtraTool";

const BUILTIN_CATALOG: &str = include_str!("catalog.json");

/// A group of tools loaded on demand through `useExtraTool`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtraToolGroup {
    pub name: String,
    pub description: String,
    /// Instructions handed to the model once the group is loaded
    #[serde(default)]
    pub context: String,
    pub tools: Vec<ToolDefinition>,
    #[serde(default)]
    pub read_only: Vec<String>,
}

impl ExtraToolGroup {
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn is_read_only(&self, tool: &str) -> bool {
        self.read_only.iter().any(|t| t == tool)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Catalog {
    tools: Vec<ToolDefinition>,
    #[serde(default)]
    read_only: Vec<String>,
    #[serde(default)]
    destructive: Vec<String>,
    #[serde(default)]
    reversible: Vec<(String, String)>,
    #[serde(default)]
    heavy: Vec<String>,
    #[serde(default)]
    budget_exempt: Vec<String>,
    #[serde(default)]
    extra_groups: Vec<ExtraToolGroup>,
}

/// Errors raised while building a registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Failed to parse tool catalog: {0}")]
    Parse(String),

    #[error("Tool '{0}' is defined more than once")]
    Duplicate(String),

    #[error("Tool '{0}' is classified both read-only and destructive")]
    ReadOnlyDestructive(String),

    #[error("{set} lists unknown tool '{name}'")]
    UnknownTool { set: &'static str, name: String },
}

impl From<RegistryError> for toolgate_core::Error {
    fn from(err: RegistryError) -> Self {
        toolgate_core::Error::Config {
            message: err.to_string(),
        }
    }
}

/// The tool catalog plus its classification tables.
#[derive(Debug)]
pub struct ToolRegistry {
    core: Vec<ToolDefinition>,
    by_name: HashMap<String, ToolDefinition>,
    groups: Vec<ExtraToolGroup>,
    group_of: HashMap<String, usize>,
    read_only: HashSet<String>,
    destructive: HashSet<String>,
    undo: HashMap<String, String>,
    heavy: HashSet<String>,
    budget_exempt: HashSet<String>,
}

impl ToolRegistry {
    /// The built-in messaging catalog.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_catalog_json(BUILTIN_CATALOG)
    }

    /// Parse a catalog document with the same shape as the built-in one.
    pub fn from_catalog_json(json: &str) -> Result<Self, RegistryError> {
        let catalog: Catalog =
            serde_json::from_str(json).map_err(|e| RegistryError::Parse(e.to_string()))?;

        let mut builder = Self::builder();
        for tool in catalog.tools {
            builder = builder.tool(tool);
        }
        for name in catalog.read_only {
            builder = builder.read_only(name);
        }
        for name in catalog.destructive {
            builder = builder.destructive(name);
        }
        for (tool, undo) in catalog.reversible {
            builder = builder.reversible(tool, undo);
        }
        for name in catalog.heavy {
            builder = builder.heavy(name);
        }
        for name in catalog.budget_exempt {
            builder = builder.budget_exempt(name);
        }
        for group in catalog.extra_groups {
            builder = builder.extra_group(group);
        }
        builder.build()
    }

    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Look up any tool, core or extra.
    pub fn get_tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.by_name.get(name)
    }

    /// Read-only: a core read-only tool, or listed read-only by its group.
    pub fn is_read_only(&self, name: &str) -> bool {
        if self.read_only.contains(name) {
            return true;
        }
        self.group_for_tool(name)
            .is_some_and(|g| g.is_read_only(name))
    }

    pub fn is_destructive(&self, name: &str) -> bool {
        self.destructive.contains(name)
    }

    pub fn is_undoable(&self, name: &str) -> bool {
        self.undo.contains_key(name)
    }

    /// The inverse tool, for tools with a registered undo.
    pub fn undo_tool_for(&self, name: &str) -> Option<&str> {
        self.undo.get(name).map(String::as_str)
    }

    /// Heavy operations get the longer call spacing.
    pub fn is_heavy(&self, name: &str) -> bool {
        self.heavy.contains(name)
    }

    /// Calls that do not count against the per-run call budget.
    pub fn is_budget_exempt(&self, name: &str) -> bool {
        self.budget_exempt.contains(name)
    }

    /// Core tools in catalog order.
    pub fn core_definitions(&self) -> &[ToolDefinition] {
        &self.core
    }

    /// Core read-only tools in catalog order.
    pub fn read_only_definitions(&self) -> Vec<ToolDefinition> {
        self.core
            .iter()
            .filter(|t| self.read_only.contains(&t.name))
            .cloned()
            .collect()
    }

    pub fn extra_groups(&self) -> &[ExtraToolGroup] {
        &self.groups
    }

    pub fn extra_group(&self, name: &str) -> Option<&ExtraToolGroup> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// The extra group a tool belongs to, if any.
    pub fn group_for_tool(&self, tool: &str) -> Option<&ExtraToolGroup> {
        self.group_of.get(tool).map(|&i| &self.groups[i])
    }

    /// Core tools followed by every extra tool, each name once.
    pub fn all_definitions(&self) -> Vec<ToolDefinition> {
        let mut seen = HashSet::new();
        self.core
            .iter()
            .chain(self.groups.iter().flat_map(|g| g.tools.iter()))
            .filter(|t| seen.insert(t.name.clone()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

/// Builds a [`ToolRegistry`] from caller-supplied definitions.
///
/// `build()` checks that classified names exist and that no tool is both
/// read-only and destructive. Reversible pairs are registered in both
/// directions.
#[derive(Default)]
pub struct RegistryBuilder {
    tools: Vec<ToolDefinition>,
    read_only: Vec<String>,
    destructive: Vec<String>,
    reversible: Vec<(String, String)>,
    heavy: Vec<String>,
    budget_exempt: Vec<String>,
    groups: Vec<ExtraToolGroup>,
}

impl RegistryBuilder {
    pub fn tool(mut self, def: ToolDefinition) -> Self {
        self.tools.push(def);
        self
    }

    pub fn read_only(mut self, name: impl Into<String>) -> Self {
        self.read_only.push(name.into());
        self
    }

    pub fn destructive(mut self, name: impl Into<String>) -> Self {
        self.destructive.push(name.into());
        self
    }

    pub fn reversible(mut self, tool: impl Into<String>, undo: impl Into<String>) -> Self {
        self.reversible.push((tool.into(), undo.into()));
        self
    }

    pub fn heavy(mut self, name: impl Into<String>) -> Self {
        self.heavy.push(name.into());
        self
    }

    pub fn budget_exempt(mut self, name: impl Into<String>) -> Self {
        self.budget_exempt.push(name.into());
        self
    }

    pub fn extra_group(mut self, group: ExtraToolGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn build(self) -> Result<ToolRegistry, RegistryError> {
        let mut by_name = HashMap::new();
        let mut group_of = HashMap::new();

        for tool in &self.tools {
            if by_name.insert(tool.name.clone(), tool.clone()).is_some() {
                return Err(RegistryError::Duplicate(tool.name.clone()));
            }
        }
        for (i, group) in self.groups.iter().enumerate() {
            for tool in &group.tools {
                if by_name.insert(tool.name.clone(), tool.clone()).is_some() {
                    return Err(RegistryError::Duplicate(tool.name.clone()));
                }
                group_of.insert(tool.name.clone(), i);
            }
            for name in &group.read_only {
                if !group.tools.iter().any(|t| &t.name == name) {
                    return Err(RegistryError::UnknownTool {
                        set: "extra group read-only list",
                        name: name.clone(),
                    });
                }
            }
        }

        let known = |set: &'static str, names: &[String]| -> Result<HashSet<String>, RegistryError> {
            names
                .iter()
                .map(|n| {
                    if by_name.contains_key(n) {
                        Ok(n.clone())
                    } else {
                        Err(RegistryError::UnknownTool { set, name: n.clone() })
                    }
                })
                .collect()
        };

        let read_only = known("read-only set", &self.read_only)?;
        let destructive = known("destructive set", &self.destructive)?;
        let heavy = known("heavy set", &self.heavy)?;
        let budget_exempt = known("budget-exempt set", &self.budget_exempt)?;

        if let Some(name) = read_only.intersection(&destructive).next() {
            return Err(RegistryError::ReadOnlyDestructive(name.clone()));
        }
        for group in &self.groups {
            if let Some(name) = group.read_only.iter().find(|n| destructive.contains(*n)) {
                return Err(RegistryError::ReadOnlyDestructive(name.clone()));
            }
        }

        let mut undo = HashMap::new();
        for (tool, inverse) in &self.reversible {
            for name in [tool, inverse] {
                if !by_name.contains_key(name) {
                    return Err(RegistryError::UnknownTool {
                        set: "reversible map",
                        name: name.clone(),
                    });
                }
            }
            undo.insert(tool.clone(), inverse.clone());
            undo.insert(inverse.clone(), tool.clone());
        }

        Ok(ToolRegistry {
            core: self.tools,
            by_name,
            groups: self.groups,
            group_of,
            read_only,
            destructive,
            undo,
            heavy,
            budget_exempt,
        })
    }
}

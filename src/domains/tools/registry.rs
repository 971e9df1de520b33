//! Tool Registry - the live set of callable tools.
//!
//! The registry holds an immutable snapshot behind a lock and replaces it
//! wholesale on every change. Readers clone the `Arc` and keep a consistent
//! view for as long as they need it: they see the old tool set or the new
//! one, never a mix.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use rmcp::model::Tool;
use thiserror::Error;
use tracing::debug;

use super::generator::GeneratedTool;

/// Tool names that are already taken.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("tool names already registered: {}", .0.join(", "))]
pub struct NameCollision(pub Vec<String>);

/// A tool plus the category it was registered under (its protocol name).
#[derive(Debug, Clone)]
pub struct RegisteredTool {
    pub category: String,
    pub tool: GeneratedTool,
}

/// Immutable view of the registry at one point in time.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    tools: BTreeMap<String, RegisteredTool>,
}

impl RegistrySnapshot {
    pub fn get(&self, name: &str) -> Option<&GeneratedTool> {
        self.tools.get(name).map(|r| &r.tool)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Registered tools in name order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredTool> {
        self.tools.values()
    }

    /// Names of the tools registered under `category`.
    pub fn names_in(&self, category: &str) -> Vec<String> {
        self.tools
            .iter()
            .filter(|(_, r)| r.category == category)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Central registry of generated tools.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    snapshot: RwLock<Arc<RegistrySnapshot>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<GeneratedTool> {
        self.snapshot().get(name).cloned()
    }

    /// MCP metadata of every registered tool.
    ///
    /// Single source of truth for the stdio and HTTP tool listings.
    pub fn list(&self) -> Vec<Tool> {
        self.snapshot().iter().map(|r| r.tool.to_tool()).collect()
    }

    /// Get all tool names.
    pub fn tool_names(&self) -> Vec<String> {
        self.snapshot().tools.keys().cloned().collect()
    }

    /// Register one tool. Fails if the name is taken.
    pub fn register(&self, category: &str, tool: GeneratedTool) -> Result<(), NameCollision> {
        self.replace(&[], category, vec![tool])
    }

    /// Remove one tool by name. Returns whether it was present.
    pub fn unregister(&self, name: &str) -> bool {
        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());
        if !guard.contains(name) {
            return false;
        }
        let mut next = RegistrySnapshot::clone(&guard);
        next.tools.remove(name);
        *guard = Arc::new(next);
        true
    }

    /// Atomically remove `remove` and add `add` under `category`.
    ///
    /// Every added name must be free once `remove` is gone and distinct from
    /// the other added names; otherwise nothing changes.
    pub fn replace(
        &self,
        remove: &[String],
        category: &str,
        add: Vec<GeneratedTool>,
    ) -> Result<(), NameCollision> {
        let mut guard = self.snapshot.write().unwrap_or_else(|e| e.into_inner());

        let mut next = RegistrySnapshot::clone(&guard);
        for name in remove {
            next.tools.remove(name);
        }

        let mut collisions = Vec::new();
        for tool in add {
            let name = tool.name().to_string();
            if next.tools.contains_key(&name) {
                collisions.push(name);
                continue;
            }
            next.tools.insert(
                name,
                RegisteredTool {
                    category: category.to_string(),
                    tool,
                },
            );
        }

        if !collisions.is_empty() {
            return Err(NameCollision(collisions));
        }

        debug!(
            category,
            removed = remove.len(),
            total = next.tools.len(),
            "Swapped tool registry snapshot"
        );
        *guard = Arc::new(next);
        Ok(())
    }
}

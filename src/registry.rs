//! Tool and agent registries.
//!
//! Collaborator lookups consulted at graph-build time: a tool-invocation or
//! agent-delegation node must reference a registered descriptor, otherwise
//! the add-operation fails locally instead of deferring to remote deployment.

use std::collections::HashMap;

use crate::schema::TypeDef;

/// Descriptor for an external tool a flow node can invoke.
///
/// Carries the tool's natural parameter and return shapes; nodes that do not
/// supply explicit schemas inherit these.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub input: Option<TypeDef>,
    pub output: Option<TypeDef>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input: None,
            output: None,
        }
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn input(mut self, def: TypeDef) -> Self {
        self.input = Some(def);
        self
    }

    pub fn output(mut self, def: TypeDef) -> Self {
        self.output = Some(def);
        self
    }
}

/// Descriptor for an agent a flow node can delegate to.
#[derive(Debug, Clone)]
pub struct AgentDescriptor {
    pub name: String,
    pub description: Option<String>,
}

impl AgentDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}

/// Lookup of tools by name. Synchronous and side-effect-free from the
/// compiler's point of view.
pub trait ToolRegistry: Send + Sync {
    fn lookup(&self, name: &str) -> Option<ToolDescriptor>;

    /// Registered names, for error suggestions.
    fn names(&self) -> Vec<String>;
}

/// Lookup of agents by name.
pub trait AgentRegistry: Send + Sync {
    fn lookup(&self, name: &str) -> Option<AgentDescriptor>;

    fn names(&self) -> Vec<String>;
}

/// In-memory tool registry.
#[derive(Debug, Clone, Default)]
pub struct InMemoryToolRegistry {
    tools: HashMap<String, ToolDescriptor>,
}

impl InMemoryToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: ToolDescriptor) {
        self.tools.insert(descriptor.name.clone(), descriptor);
    }

    pub fn with(mut self, descriptor: ToolDescriptor) -> Self {
        self.register(descriptor);
        self
    }
}

impl ToolRegistry for InMemoryToolRegistry {
    fn lookup(&self, name: &str) -> Option<ToolDescriptor> {
        self.tools.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }
}

/// In-memory agent registry.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAgentRegistry {
    agents: HashMap<String, AgentDescriptor>,
}

impl InMemoryAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: AgentDescriptor) {
        self.agents.insert(descriptor.name.clone(), descriptor);
    }

    pub fn with(mut self, descriptor: AgentDescriptor) -> Self {
        self.register(descriptor);
        self
    }
}

impl AgentRegistry for InMemoryAgentRegistry {
    fn lookup(&self, name: &str) -> Option<AgentDescriptor> {
        self.agents.get(name).cloned()
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_lookup() {
        let registry = InMemoryToolRegistry::new().with(
            ToolDescriptor::new("fetch_fact")
                .describe("Fetch a fact")
                .output(TypeDef::string()),
        );

        let descriptor = registry.lookup("fetch_fact").unwrap();
        assert_eq!(descriptor.name, "fetch_fact");
        assert!(descriptor.output.is_some());
        assert!(registry.lookup("missing").is_none());
    }

    #[test]
    fn test_names_sorted() {
        let registry = InMemoryToolRegistry::new()
            .with(ToolDescriptor::new("zeta"))
            .with(ToolDescriptor::new("alpha"));
        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_agent_lookup() {
        let registry =
            InMemoryAgentRegistry::new().with(AgentDescriptor::new("mailer").describe("Sends mail"));
        assert!(registry.lookup("mailer").is_some());
        assert!(registry.lookup("other").is_none());
    }
}

//! Fluent flow construction.
//!
//! A [`FlowBuilder`] accumulates nodes and directed edges into a
//! [`FlowDefinition`]. Structural checks run eagerly on every add-operation
//! (duplicate names, foreign handles, edges out of END); the global
//! well-formedness check runs once, at compile time.
//!
//! Loop bodies, user flows and sub-flows are nested scopes: the closure you
//! pass gets its own builder, and handles from one scope are rejected by
//! another.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::FlowBuildError;
use crate::node::{
    AgentNode, BranchNode, DocClassifierNode, DocExtNode, DocProcNode, LoopNode, Node, NodeKind,
    ScriptNode, SubflowNode, TimerNode, ToolNode, UserField,
};
use crate::registry::{AgentRegistry, InMemoryAgentRegistry, InMemoryToolRegistry, ToolRegistry};
use crate::schema::{valid_name, TypeDef, TypeRegistry};

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

// ─────────────────────────────────────────────────────────────
// Handles and endpoints
// ─────────────────────────────────────────────────────────────

/// Handle to a node, usable in edge construction within the scope that
/// created it.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    name: Arc<str>,
    scope: u64,
}

impl NodeHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::Node(self.clone())
    }
}

/// One end of a directed edge: a node handle or a sentinel.
#[derive(Debug, Clone)]
pub enum Endpoint {
    Start,
    End,
    Node(NodeHandle),
}

/// Entry sentinel of a scope.
pub const START: Endpoint = Endpoint::Start;
/// Exit sentinel of a scope.
pub const END: Endpoint = Endpoint::End;

impl From<&NodeHandle> for Endpoint {
    fn from(handle: &NodeHandle) -> Self {
        Endpoint::Node(handle.clone())
    }
}

impl From<NodeHandle> for Endpoint {
    fn from(handle: NodeHandle) -> Self {
        Endpoint::Node(handle)
    }
}

/// Resolved edge endpoint stored in a definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EndpointName {
    Start,
    End,
    Node(String),
}

impl EndpointName {
    pub(crate) fn as_str(&self) -> &str {
        match self {
            EndpointName::Start => "start",
            EndpointName::End => "end",
            EndpointName::Node(name) => name,
        }
    }
}

/// Directed edge, with an optional guard expression for conditional edges.
#[derive(Debug, Clone)]
pub(crate) struct Edge {
    pub(crate) from: EndpointName,
    pub(crate) to: EndpointName,
    pub(crate) guard: Option<String>,
}

// ─────────────────────────────────────────────────────────────
// Flow definition
// ─────────────────────────────────────────────────────────────

/// The accumulated flow: nodes, edges and metadata. Created by a
/// [`FlowBuilder`], frozen by compilation, never mutated afterwards.
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    pub(crate) name: String,
    pub(crate) display_name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) input: Option<TypeDef>,
    pub(crate) output: Option<TypeDef>,
    pub(crate) private: Option<TypeDef>,
    pub(crate) schedulable: bool,
    pub(crate) types: TypeRegistry,
    pub(crate) nodes: IndexMap<String, Node>,
    pub(crate) edges: Vec<Edge>,
}

impl FlowDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────

/// Fluent builder for a flow graph.
pub struct FlowBuilder {
    def: FlowDefinition,
    tools: Arc<dyn ToolRegistry>,
    agents: Arc<dyn AgentRegistry>,
    scope: u64,
}

impl std::fmt::Debug for FlowBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowBuilder")
            .field("def", &self.def)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl FlowBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            def: FlowDefinition {
                name: valid_name(name),
                display_name: None,
                description: None,
                input: None,
                output: None,
                private: None,
                schedulable: false,
                types: TypeRegistry::new(),
                nodes: IndexMap::new(),
                edges: Vec::new(),
            },
            tools: Arc::new(InMemoryToolRegistry::new()),
            agents: Arc::new(InMemoryAgentRegistry::new()),
            scope: NEXT_SCOPE.fetch_add(1, Ordering::Relaxed),
        }
    }

    // ── metadata ────────────────────────────────────────────

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.def.display_name = Some(name.into());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.def.description = Some(text.into());
        self
    }

    pub fn input(mut self, def: TypeDef) -> Self {
        self.def.input = Some(def);
        self
    }

    pub fn output(mut self, def: TypeDef) -> Self {
        self.def.output = Some(def);
        self
    }

    /// Flow-local scratch state schema.
    pub fn private(mut self, def: TypeDef) -> Self {
        self.def.private = Some(def);
        self
    }

    pub fn schedulable(mut self, schedulable: bool) -> Self {
        self.def.schedulable = schedulable;
        self
    }

    pub fn with_tools(mut self, tools: Arc<dyn ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_agents(mut self, agents: Arc<dyn AgentRegistry>) -> Self {
        self.agents = agents;
        self
    }

    /// Register a named type for [`TypeDef::Reference`] resolution.
    pub fn register_type(&mut self, name: impl Into<String>, def: TypeDef) {
        self.def.types.register(name, def);
    }

    // ── node add-operations ─────────────────────────────────

    /// Add a tool-invocation node. The tool must be registered; unresolved
    /// references fail here, at graph-build time.
    pub fn tool(&mut self, cfg: ToolNode) -> Result<NodeHandle, FlowBuildError> {
        let descriptor =
            self.tools
                .lookup(&cfg.tool)
                .ok_or_else(|| FlowBuildError::UnknownTool {
                    name: cfg.tool.clone(),
                    available: self.tools.names(),
                })?;

        let name = self.claim_name(cfg.name.as_deref(), "tool")?;
        self.insert(Node {
            name,
            display_name: cfg.display_name,
            description: cfg.description.or(descriptor.description),
            input: cfg.input.or(descriptor.input),
            output: cfg.output.or(descriptor.output),
            kind: NodeKind::Tool {
                tool: cfg.tool,
                error_handler: cfg.error_handler,
            },
        })
    }

    /// Add an agent-delegation node. The agent must be registered.
    pub fn agent(&mut self, cfg: AgentNode) -> Result<NodeHandle, FlowBuildError> {
        let descriptor =
            self.agents
                .lookup(&cfg.agent)
                .ok_or_else(|| FlowBuildError::UnknownAgent {
                    name: cfg.agent.clone(),
                    available: self.agents.names(),
                })?;

        let name = self.claim_name(cfg.name.as_deref(), "agent")?;
        self.insert(Node {
            name,
            display_name: cfg.display_name,
            description: cfg.description.or(descriptor.description),
            input: cfg.input,
            output: cfg.output,
            kind: NodeKind::Agent {
                agent: cfg.agent,
                message: cfg.message,
            },
        })
    }

    pub fn script(&mut self, cfg: ScriptNode) -> Result<NodeHandle, FlowBuildError> {
        let name = self.claim_name(cfg.name.as_deref(), "script")?;
        self.insert(Node {
            name,
            display_name: cfg.display_name,
            description: cfg.description,
            input: cfg.input,
            output: cfg.output,
            kind: NodeKind::Script { script: cfg.script },
        })
    }

    pub fn timer(&mut self, cfg: TimerNode) -> Result<NodeHandle, FlowBuildError> {
        let name = self.claim_name(cfg.name.as_deref(), "timer")?;
        self.insert(Node {
            name,
            display_name: cfg.display_name,
            description: cfg.description,
            input: cfg.input,
            output: cfg.output,
            kind: NodeKind::Timer {
                delay_ms: cfg.delay_ms,
            },
        })
    }

    pub fn branch(&mut self, cfg: BranchNode) -> Result<NodeHandle, FlowBuildError> {
        let name = self.claim_name(cfg.name.as_deref(), "branch")?;
        self.insert(Node {
            name,
            display_name: cfg.display_name,
            description: cfg.description,
            input: cfg.input,
            output: cfg.output,
            kind: NodeKind::Branch {
                evaluator: cfg.evaluator,
            },
        })
    }

    pub fn docproc(&mut self, cfg: DocProcNode) -> Result<NodeHandle, FlowBuildError> {
        let name = self.claim_name(cfg.name.as_deref(), "docproc")?;
        self.insert(Node {
            name,
            display_name: cfg.display_name,
            description: cfg.description,
            input: cfg.input,
            output: cfg.output,
            kind: NodeKind::DocProc { task: cfg.task },
        })
    }

    pub fn docext(&mut self, cfg: DocExtNode) -> Result<NodeHandle, FlowBuildError> {
        let name = self.claim_name(cfg.name.as_deref(), "docext")?;
        self.insert(Node {
            name,
            display_name: cfg.display_name,
            description: cfg.description,
            input: cfg.input,
            output: cfg.output,
            kind: NodeKind::DocExt {
                task: cfg.task,
                llm: cfg.llm,
                entities: cfg.entities,
            },
        })
    }

    pub fn docclassifier(&mut self, cfg: DocClassifierNode) -> Result<NodeHandle, FlowBuildError> {
        let name = self.claim_name(cfg.name.as_deref(), "docclassifier")?;
        self.insert(Node {
            name,
            display_name: cfg.display_name,
            description: cfg.description,
            input: cfg.input,
            output: cfg.output,
            kind: NodeKind::DocClassifier {
                task: cfg.task,
                llm: cfg.llm,
                classes: cfg.classes,
            },
        })
    }

    /// Add a conditional loop. The closure builds the loop body in its own
    /// nested scope; the returned handle stands for the whole loop in the
    /// parent graph.
    pub fn loop_while<F>(&mut self, cfg: LoopNode, build: F) -> Result<NodeHandle, FlowBuildError>
    where
        F: FnOnce(&mut FlowBuilder) -> Result<(), FlowBuildError>,
    {
        let name = self.claim_name(cfg.name.as_deref(), "loop")?;
        let body = self.build_body(&name, build)?;
        self.insert(Node {
            name,
            display_name: cfg.display_name,
            description: cfg.description,
            input: cfg.input,
            output: cfg.output,
            kind: NodeKind::Loop {
                evaluator: cfg.evaluator,
                body,
            },
        })
    }

    /// Add a user-interaction sub-flow built from fields and edges.
    pub fn userflow<F>(&mut self, build: F) -> Result<NodeHandle, FlowBuildError>
    where
        F: FnOnce(&mut UserFlowBuilder) -> Result<(), FlowBuildError>,
    {
        let name = self.claim_name(None, "userflow")?;
        let mut inner = self.child_builder(&name);
        let mut user = UserFlowBuilder { inner: &mut inner };
        build(&mut user)?;
        let body = inner.def;
        self.insert(Node {
            name,
            display_name: None,
            description: None,
            input: None,
            output: None,
            kind: NodeKind::UserFlow { body },
        })
    }

    /// Add a nested sub-flow usable as a single node in this graph.
    pub fn subflow<F>(&mut self, cfg: SubflowNode, build: F) -> Result<NodeHandle, FlowBuildError>
    where
        F: FnOnce(&mut FlowBuilder) -> Result<(), FlowBuildError>,
    {
        let name = self.claim_name(cfg.name.as_deref(), "subflow")?;
        let body = self.build_body(&name, build)?;
        self.insert(Node {
            name,
            display_name: cfg.display_name,
            description: cfg.description,
            input: cfg.input,
            output: cfg.output,
            kind: NodeKind::Subflow { body },
        })
    }

    // ── edges ───────────────────────────────────────────────

    /// Add a directed edge. Rejects handles from another scope.
    pub fn edge(
        &mut self,
        from: impl Into<Endpoint>,
        to: impl Into<Endpoint>,
    ) -> Result<&mut Self, FlowBuildError> {
        self.add_edge(from.into(), to.into(), None)
    }

    /// Add an edge guarded by an evaluator expression.
    pub fn conditional_edge(
        &mut self,
        from: impl Into<Endpoint>,
        to: impl Into<Endpoint>,
        guard: impl Into<String>,
    ) -> Result<&mut Self, FlowBuildError> {
        self.add_edge(from.into(), to.into(), Some(guard.into()))
    }

    /// Chain endpoints pairwise: `sequence([START, a, b, END])` adds
    /// START→a, a→b, b→END.
    pub fn sequence(
        &mut self,
        chain: impl IntoIterator<Item = Endpoint>,
    ) -> Result<&mut Self, FlowBuildError> {
        let chain: Vec<Endpoint> = chain.into_iter().collect();
        if chain.len() < 2 {
            return Err(FlowBuildError::SequenceTooShort { found: chain.len() });
        }
        for pair in chain.windows(2) {
            self.add_edge(pair[0].clone(), pair[1].clone(), None)?;
        }
        Ok(self)
    }

    /// Freeze the accumulated definition. Structural well-formedness is
    /// checked by compilation, not here.
    pub fn build(self) -> FlowDefinition {
        self.def
    }

    // ── internals ───────────────────────────────────────────

    fn child_builder(&self, node_name: &str) -> FlowBuilder {
        let mut child = FlowBuilder::new(&format!("{}_{node_name}", self.def.name));
        child.tools = Arc::clone(&self.tools);
        child.agents = Arc::clone(&self.agents);
        child
    }

    fn build_body<F>(&mut self, node_name: &str, build: F) -> Result<FlowDefinition, FlowBuildError>
    where
        F: FnOnce(&mut FlowBuilder) -> Result<(), FlowBuildError>,
    {
        let mut child = self.child_builder(node_name);
        build(&mut child)?;
        // Types registered inside the body surface on the root definition.
        self.def.types.merge(child.def.types.clone());
        Ok(child.def)
    }

    /// Resolve the name for a new node: sanitize caller-supplied names and
    /// reject duplicates immediately; auto-number anonymous nodes.
    fn claim_name(
        &mut self,
        requested: Option<&str>,
        base: &'static str,
    ) -> Result<String, FlowBuildError> {
        match requested {
            Some(raw) => {
                let name = valid_name(raw);
                if name == "start" || name == "end" {
                    return Err(FlowBuildError::ReservedNodeName { name });
                }
                if self.def.nodes.contains_key(&name) {
                    return Err(FlowBuildError::DuplicateNodeName {
                        scope: self.def.name.clone(),
                        name,
                    });
                }
                Ok(name)
            }
            None => {
                let mut n = 1;
                loop {
                    let candidate = format!("{base}_{n}");
                    if !self.def.nodes.contains_key(&candidate) {
                        return Ok(candidate);
                    }
                    n += 1;
                }
            }
        }
    }

    fn insert(&mut self, node: Node) -> Result<NodeHandle, FlowBuildError> {
        node.validate()?;
        let handle = NodeHandle {
            name: Arc::from(node.name.as_str()),
            scope: self.scope,
        };
        self.def.nodes.insert(node.name.clone(), node);
        Ok(handle)
    }

    fn resolve(&self, endpoint: Endpoint) -> Result<EndpointName, FlowBuildError> {
        match endpoint {
            Endpoint::Start => Ok(EndpointName::Start),
            Endpoint::End => Ok(EndpointName::End),
            Endpoint::Node(handle) => {
                if handle.scope != self.scope {
                    return Err(FlowBuildError::ForeignHandle {
                        scope: self.def.name.clone(),
                        name: handle.name().to_string(),
                    });
                }
                Ok(EndpointName::Node(handle.name().to_string()))
            }
        }
    }

    fn add_edge(
        &mut self,
        from: Endpoint,
        to: Endpoint,
        guard: Option<String>,
    ) -> Result<&mut Self, FlowBuildError> {
        if matches!(from, Endpoint::End) {
            return Err(FlowBuildError::EdgeFromEnd);
        }
        if matches!(to, Endpoint::Start) {
            return Err(FlowBuildError::EdgeIntoStart);
        }
        let from = self.resolve(from)?;
        let to = self.resolve(to)?;
        self.def.edges.push(Edge { from, to, guard });
        Ok(self)
    }
}

/// Restricted builder handed to `userflow` closures: fields and edges only.
pub struct UserFlowBuilder<'a> {
    inner: &'a mut FlowBuilder,
}

impl UserFlowBuilder<'_> {
    /// Add one user-interaction field.
    pub fn field(&mut self, cfg: UserField) -> Result<NodeHandle, FlowBuildError> {
        let name = self.inner.claim_name(Some(&cfg.name), "field")?;
        self.inner.insert(Node {
            name,
            display_name: cfg.display_name,
            description: None,
            input: None,
            output: None,
            kind: NodeKind::UserField {
                direction: cfg.direction,
                field_kind: cfg.kind,
                text: cfg.text,
                output_map: cfg.output_map,
            },
        })
    }

    pub fn edge(
        &mut self,
        from: impl Into<Endpoint>,
        to: impl Into<Endpoint>,
    ) -> Result<&mut Self, FlowBuildError> {
        self.inner.edge(from, to)?;
        Ok(self)
    }

    pub fn sequence(
        &mut self,
        chain: impl IntoIterator<Item = Endpoint>,
    ) -> Result<&mut Self, FlowBuildError> {
        self.inner.sequence(chain)?;
        Ok(self)
    }
}

//! Node model: the closed set of typed graph-node variants.
//!
//! Every node carries a unique name, optional display metadata, and input /
//! output type descriptions; the variant-specific configuration lives in
//! [`NodeKind`]. Adding a new kind is a compile-time-checked change: the spec
//! compiler matches exhaustively over this enum.

use serde::{Deserialize, Serialize};

use crate::error::InvalidNodeConfiguration;
use crate::flow::FlowDefinition;
use crate::schema::{SchemaRef, TypeDef};

// ─────────────────────────────────────────────────────────────
// Shared config pieces
// ─────────────────────────────────────────────────────────────

/// Retry/error policy attached to a tool-invocation node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorHandlerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub max_retries: u32,
    pub retry_interval_ms: u64,
}

impl ErrorHandlerConfig {
    pub fn new(max_retries: u32, retry_interval_ms: u64) -> Self {
        Self {
            error_message: None,
            max_retries,
            retry_interval_ms,
        }
    }

    pub fn message(mut self, text: impl Into<String>) -> Self {
        self.error_message = Some(text.into());
        self
    }
}

/// One entity a document-extraction node pulls out of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocExtEntity {
    /// Human-facing entity name, e.g. "Agreement date".
    pub name: String,
    /// Field name the extracted value lands under in the node output.
    pub field_name: String,
}

impl DocExtEntity {
    pub fn new(name: impl Into<String>, field_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_name: field_name.into(),
        }
    }
}

/// Whether a user-interaction field collects or presents a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldDirection {
    Input,
    Output,
}

/// Value kind of a user-interaction field. The kind decides which optional
/// attributes are legal: only file fields may carry a download mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserFieldKind {
    Text,
    Number,
    File,
}

/// One assignment in a field's data mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub target_variable: String,
    pub value_expression: String,
}

impl Assignment {
    pub fn new(target_variable: impl Into<String>, value_expression: impl Into<String>) -> Self {
        Self {
            target_variable: target_variable.into(),
            value_expression: value_expression.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────
// Node
// ─────────────────────────────────────────────────────────────

/// One step in a flow. Owned exclusively by its containing
/// [`FlowDefinition`] (or sub-flow).
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub input: Option<TypeDef>,
    pub output: Option<TypeDef>,
    pub kind: NodeKind,
}

/// Closed enumeration of node variants.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Tool {
        tool: String,
        error_handler: Option<ErrorHandlerConfig>,
    },
    Agent {
        agent: String,
        message: String,
    },
    Script {
        script: String,
    },
    Timer {
        delay_ms: u64,
    },
    Branch {
        evaluator: String,
    },
    Loop {
        evaluator: String,
        body: FlowDefinition,
    },
    UserFlow {
        body: FlowDefinition,
    },
    /// A single field inside a user flow; never appears at top level.
    UserField {
        direction: FieldDirection,
        field_kind: UserFieldKind,
        text: Option<String>,
        output_map: Option<Vec<Assignment>>,
    },
    DocProc {
        task: String,
    },
    DocExt {
        task: String,
        llm: String,
        entities: Vec<DocExtEntity>,
    },
    DocClassifier {
        task: String,
        llm: String,
        classes: Vec<String>,
    },
    Subflow {
        body: FlowDefinition,
    },
}

impl Node {
    /// Base name used for auto-numbering anonymous nodes, and the `kind` tag
    /// emitted into node specs.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Tool { .. } => "tool",
            NodeKind::Agent { .. } => "agent",
            NodeKind::Script { .. } => "script",
            NodeKind::Timer { .. } => "timer",
            NodeKind::Branch { .. } => "branch",
            NodeKind::Loop { .. } => "loop",
            NodeKind::UserFlow { .. } => "userflow",
            NodeKind::UserField { .. } => "field",
            NodeKind::DocProc { .. } => "docproc",
            NodeKind::DocExt { .. } => "docext",
            NodeKind::DocClassifier { .. } => "docclassifier",
            NodeKind::Subflow { .. } => "subflow",
        }
    }

    /// Nested sub-flow, for the variants that own one.
    pub fn body(&self) -> Option<&FlowDefinition> {
        match &self.kind {
            NodeKind::Loop { body, .. }
            | NodeKind::UserFlow { body }
            | NodeKind::Subflow { body } => Some(body),
            _ => None,
        }
    }

    /// Check variant-specific invariants.
    pub fn validate(&self) -> Result<(), InvalidNodeConfiguration> {
        let node = self.name.clone();
        match &self.kind {
            NodeKind::Script { script } => {
                if script.trim().is_empty() {
                    return Err(InvalidNodeConfiguration::EmptyScript { node });
                }
            }
            NodeKind::Timer { delay_ms } => {
                if *delay_ms == 0 {
                    return Err(InvalidNodeConfiguration::ZeroDelay { node });
                }
            }
            NodeKind::Branch { evaluator } => {
                if evaluator.trim().is_empty() {
                    return Err(InvalidNodeConfiguration::EmptyEvaluator { node });
                }
            }
            NodeKind::Agent { message, .. } => {
                if message.trim().is_empty() {
                    return Err(InvalidNodeConfiguration::EmptyMessage { node });
                }
            }
            NodeKind::Loop { evaluator, body } => {
                if evaluator.trim().is_empty() {
                    return Err(InvalidNodeConfiguration::EmptyEvaluator { node });
                }
                if body.is_empty() {
                    return Err(InvalidNodeConfiguration::EmptyLoopBody { node });
                }
            }
            NodeKind::UserFlow { body } => {
                if body.is_empty() {
                    return Err(InvalidNodeConfiguration::EmptyUserFlow { node });
                }
            }
            NodeKind::Subflow { body } => {
                if body.is_empty() {
                    return Err(InvalidNodeConfiguration::EmptySubflow { node });
                }
            }
            NodeKind::UserField {
                field_kind,
                output_map,
                ..
            } => {
                if output_map.is_some() && *field_kind != UserFieldKind::File {
                    return Err(InvalidNodeConfiguration::MappingNotAllowed { node });
                }
            }
            NodeKind::DocExt { entities, .. } => {
                if entities.is_empty() {
                    return Err(InvalidNodeConfiguration::NoEntities { node });
                }
            }
            NodeKind::DocClassifier { classes, .. } => {
                if classes.len() < 2 {
                    return Err(InvalidNodeConfiguration::TooFewClasses {
                        node,
                        found: classes.len(),
                    });
                }
            }
            NodeKind::Tool { .. } | NodeKind::DocProc { .. } => {}
        }
        Ok(())
    }

    /// Produce the serializable node descriptor. Schema references must
    /// already be resolved to registry pointers by the caller; bodied kinds
    /// take their compiled sub-graph through `subflow`.
    pub(crate) fn to_node_spec(
        &self,
        input_schema: Option<SchemaRef>,
        output_schema: Option<SchemaRef>,
        subflow: Option<SubflowSpec>,
    ) -> NodeSpec {
        let detail = match &self.kind {
            NodeKind::Tool {
                tool,
                error_handler,
            } => NodeSpecDetail::Tool {
                tool: tool.clone(),
                error_handler: error_handler.clone(),
            },
            NodeKind::Agent { agent, message } => NodeSpecDetail::Agent {
                agent: agent.clone(),
                message: message.clone(),
            },
            NodeKind::Script { script } => NodeSpecDetail::Script {
                script: script.clone(),
            },
            NodeKind::Timer { delay_ms } => NodeSpecDetail::Timer {
                delay_ms: *delay_ms,
            },
            NodeKind::Branch { evaluator } => NodeSpecDetail::Branch {
                evaluator: evaluator.clone(),
            },
            NodeKind::Loop { evaluator, .. } => NodeSpecDetail::Loop {
                evaluator: evaluator.clone(),
                subflow: subflow.unwrap_or_default(),
            },
            NodeKind::UserFlow { .. } => NodeSpecDetail::Userflow {
                subflow: subflow.unwrap_or_default(),
            },
            NodeKind::UserField {
                direction,
                field_kind,
                text,
                output_map,
            } => NodeSpecDetail::Field {
                direction: *direction,
                field_kind: *field_kind,
                text: text.clone(),
                output_map: output_map.clone(),
            },
            NodeKind::DocProc { task } => NodeSpecDetail::Docproc { task: task.clone() },
            NodeKind::DocExt {
                task,
                llm,
                entities,
            } => NodeSpecDetail::Docext {
                task: task.clone(),
                llm: llm.clone(),
                entities: entities.clone(),
            },
            NodeKind::DocClassifier { task, llm, classes } => NodeSpecDetail::Docclassifier {
                task: task.clone(),
                llm: llm.clone(),
                classes: classes.clone(),
            },
            NodeKind::Subflow { .. } => NodeSpecDetail::Subflow {
                subflow: subflow.unwrap_or_default(),
            },
        };

        NodeSpec {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            description: self.description.clone(),
            input_schema,
            output_schema,
            detail,
        }
    }
}

// ─────────────────────────────────────────────────────────────
// Serializable node specs
// ─────────────────────────────────────────────────────────────

/// Serializable descriptor of one node in a compiled spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<SchemaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<SchemaRef>,
    #[serde(flatten)]
    pub detail: NodeSpecDetail,
}

/// Variant-specific part of a node descriptor, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeSpecDetail {
    Tool {
        tool: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error_handler: Option<ErrorHandlerConfig>,
    },
    Agent {
        agent: String,
        message: String,
    },
    Script {
        script: String,
    },
    Timer {
        delay_ms: u64,
    },
    Branch {
        evaluator: String,
    },
    Loop {
        evaluator: String,
        subflow: SubflowSpec,
    },
    Userflow {
        subflow: SubflowSpec,
    },
    Field {
        direction: FieldDirection,
        field_kind: UserFieldKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        output_map: Option<Vec<Assignment>>,
    },
    Docproc {
        task: String,
    },
    Docext {
        task: String,
        llm: String,
        entities: Vec<DocExtEntity>,
    },
    Docclassifier {
        task: String,
        llm: String,
        classes: Vec<String>,
    },
    Subflow {
        subflow: SubflowSpec,
    },
}

impl NodeSpecDetail {
    pub fn kind(&self) -> &'static str {
        match self {
            NodeSpecDetail::Tool { .. } => "tool",
            NodeSpecDetail::Agent { .. } => "agent",
            NodeSpecDetail::Script { .. } => "script",
            NodeSpecDetail::Timer { .. } => "timer",
            NodeSpecDetail::Branch { .. } => "branch",
            NodeSpecDetail::Loop { .. } => "loop",
            NodeSpecDetail::Userflow { .. } => "userflow",
            NodeSpecDetail::Field { .. } => "field",
            NodeSpecDetail::Docproc { .. } => "docproc",
            NodeSpecDetail::Docext { .. } => "docext",
            NodeSpecDetail::Docclassifier { .. } => "docclassifier",
            NodeSpecDetail::Subflow { .. } => "subflow",
        }
    }
}

/// A compiled sub-graph, kept nested under its owning node's descriptor
/// rather than flattened into the parent's node list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubflowSpec {
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
}

/// One directed edge in a compiled spec. Sentinels serialize as `start` and
/// `end`, which is why those node names are reserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSpec {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
}

// ─────────────────────────────────────────────────────────────
// Per-kind builder configs (consumed by FlowBuilder)
// ─────────────────────────────────────────────────────────────

macro_rules! common_setters {
    () => {
        pub fn name(mut self, name: impl Into<String>) -> Self {
            self.name = Some(name.into());
            self
        }

        pub fn display_name(mut self, name: impl Into<String>) -> Self {
            self.display_name = Some(name.into());
            self
        }

        pub fn description(mut self, text: impl Into<String>) -> Self {
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
    };
}

/// Config for a tool-invocation node.
#[derive(Debug, Clone)]
pub struct ToolNode {
    pub(crate) tool: String,
    pub(crate) name: Option<String>,
    pub(crate) display_name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) input: Option<TypeDef>,
    pub(crate) output: Option<TypeDef>,
    pub(crate) error_handler: Option<ErrorHandlerConfig>,
}

impl ToolNode {
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            name: None,
            display_name: None,
            description: None,
            input: None,
            output: None,
            error_handler: None,
        }
    }

    common_setters!();

    pub fn error_handler(mut self, config: ErrorHandlerConfig) -> Self {
        self.error_handler = Some(config);
        self
    }
}

/// Config for an agent-delegation node.
#[derive(Debug, Clone)]
pub struct AgentNode {
    pub(crate) agent: String,
    pub(crate) message: String,
    pub(crate) name: Option<String>,
    pub(crate) display_name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) input: Option<TypeDef>,
    pub(crate) output: Option<TypeDef>,
}

impl AgentNode {
    pub fn new(agent: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            message: message.into(),
            name: None,
            display_name: None,
            description: None,
            input: None,
            output: None,
        }
    }

    common_setters!();
}

/// Config for a script node: an inline expression evaluated against flow state.
#[derive(Debug, Clone)]
pub struct ScriptNode {
    pub(crate) script: String,
    pub(crate) name: Option<String>,
    pub(crate) display_name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) input: Option<TypeDef>,
    pub(crate) output: Option<TypeDef>,
}

impl ScriptNode {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            name: None,
            display_name: None,
            description: None,
            input: None,
            output: None,
        }
    }

    common_setters!();
}

/// Config for a timer node.
#[derive(Debug, Clone)]
pub struct TimerNode {
    pub(crate) delay_ms: u64,
    pub(crate) name: Option<String>,
    pub(crate) display_name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) input: Option<TypeDef>,
    pub(crate) output: Option<TypeDef>,
}

impl TimerNode {
    pub fn delay_ms(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            name: None,
            display_name: None,
            description: None,
            input: None,
            output: None,
        }
    }

    common_setters!();
}

/// Config for a conditional branch node.
#[derive(Debug, Clone)]
pub struct BranchNode {
    pub(crate) evaluator: String,
    pub(crate) name: Option<String>,
    pub(crate) display_name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) input: Option<TypeDef>,
    pub(crate) output: Option<TypeDef>,
}

impl BranchNode {
    pub fn new(evaluator: impl Into<String>) -> Self {
        Self {
            evaluator: evaluator.into(),
            name: None,
            display_name: None,
            description: None,
            input: None,
            output: None,
        }
    }

    common_setters!();
}

/// Config for a loop node; the body is built by the closure passed to
/// `FlowBuilder::loop_while`.
#[derive(Debug, Clone)]
pub struct LoopNode {
    pub(crate) evaluator: String,
    pub(crate) name: Option<String>,
    pub(crate) display_name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) input: Option<TypeDef>,
    pub(crate) output: Option<TypeDef>,
}

impl LoopNode {
    pub fn new(evaluator: impl Into<String>) -> Self {
        Self {
            evaluator: evaluator.into(),
            name: None,
            display_name: None,
            description: None,
            input: None,
            output: None,
        }
    }

    common_setters!();
}

/// Config for a sub-flow node.
#[derive(Debug, Clone, Default)]
pub struct SubflowNode {
    pub(crate) name: Option<String>,
    pub(crate) display_name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) input: Option<TypeDef>,
    pub(crate) output: Option<TypeDef>,
}

impl SubflowNode {
    pub fn new() -> Self {
        Self::default()
    }

    common_setters!();
}

/// Config for a document-processing node.
#[derive(Debug, Clone)]
pub struct DocProcNode {
    pub(crate) task: String,
    pub(crate) name: Option<String>,
    pub(crate) display_name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) input: Option<TypeDef>,
    pub(crate) output: Option<TypeDef>,
}

impl DocProcNode {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            name: None,
            display_name: None,
            description: None,
            input: None,
            output: None,
        }
    }

    common_setters!();
}

/// Config for a document-extraction node. When no explicit output schema is
/// given, the compiler synthesizes one from the configured entities.
#[derive(Debug, Clone)]
pub struct DocExtNode {
    pub(crate) task: String,
    pub(crate) llm: String,
    pub(crate) entities: Vec<DocExtEntity>,
    pub(crate) name: Option<String>,
    pub(crate) display_name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) input: Option<TypeDef>,
    pub(crate) output: Option<TypeDef>,
}

impl DocExtNode {
    pub fn new(llm: impl Into<String>, entities: Vec<DocExtEntity>) -> Self {
        Self {
            task: "custom_field_extraction".to_string(),
            llm: llm.into(),
            entities,
            name: None,
            display_name: None,
            description: None,
            input: None,
            output: None,
        }
    }

    common_setters!();

    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.task = task.into();
        self
    }
}

/// Config for a document-classification node.
#[derive(Debug, Clone)]
pub struct DocClassifierNode {
    pub(crate) task: String,
    pub(crate) llm: String,
    pub(crate) classes: Vec<String>,
    pub(crate) name: Option<String>,
    pub(crate) display_name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) input: Option<TypeDef>,
    pub(crate) output: Option<TypeDef>,
}

impl DocClassifierNode {
    pub fn new(llm: impl Into<String>, classes: Vec<String>) -> Self {
        Self {
            task: "document_classification".to_string(),
            llm: llm.into(),
            classes,
            name: None,
            display_name: None,
            description: None,
            input: None,
            output: None,
        }
    }

    common_setters!();

    pub fn task(mut self, task: impl Into<String>) -> Self {
        self.task = task.into();
        self
    }
}

/// Config for one user-interaction field inside a user flow.
#[derive(Debug, Clone)]
pub struct UserField {
    pub(crate) name: String,
    pub(crate) direction: FieldDirection,
    pub(crate) kind: UserFieldKind,
    pub(crate) display_name: Option<String>,
    pub(crate) text: Option<String>,
    pub(crate) output_map: Option<Vec<Assignment>>,
}

impl UserField {
    pub fn input(name: impl Into<String>, kind: UserFieldKind) -> Self {
        Self {
            name: name.into(),
            direction: FieldDirection::Input,
            kind,
            display_name: None,
            text: None,
            output_map: None,
        }
    }

    pub fn output(name: impl Into<String>, kind: UserFieldKind) -> Self {
        Self {
            name: name.into(),
            direction: FieldDirection::Output,
            kind,
            display_name: None,
            text: None,
            output_map: None,
        }
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Prompt or display text shown to the user.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Download mapping; only legal on [`UserFieldKind::File`] fields.
    pub fn output_map(mut self, assignments: Vec<Assignment>) -> Self {
        self.output_map = Some(assignments);
        self
    }
}

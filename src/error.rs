//! Error types for the flow compiler and the remote invocation layer.
//!
//! Compiler-stage errors are raised eagerly and fail the whole compilation;
//! structural graph problems are aggregated into a single
//! [`MalformedFlowError`] so one compile attempt surfaces the complete list.

use std::fmt;

use thiserror::Error;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<String>;
}

// ─────────────────────────────────────────────────────────────
// Schema derivation
// ─────────────────────────────────────────────────────────────

/// Malformed or unresolvable type description.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Field '{field}' collides with a reserved schema key")]
    ReservedKey { field: String },

    #[error("Type reference '{name}' cannot be resolved")]
    UnresolvedReference { name: String },

    #[error("Type reference '{name}' is self-referential and cannot be inlined")]
    CircularReference { name: String },

    #[error("Alternatives type has no options")]
    EmptyAlternatives,
}

impl FixSuggestion for SchemaError {
    fn fix_suggestion(&self) -> Option<String> {
        match self {
            SchemaError::ReservedKey { .. } => Some(
                "Rename the field: type, title, description, properties, required, items, nullable, anyOf and default are reserved"
                    .into(),
            ),
            SchemaError::UnresolvedReference { name } => Some(format!(
                "Register '{name}' on the builder with register_type before compiling"
            )),
            SchemaError::CircularReference { .. } => {
                Some("Break the cycle: inlined schemas cannot reference themselves".into())
            }
            SchemaError::EmptyAlternatives => {
                Some("Give the alternatives type at least one option".into())
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────
// Node configuration
// ─────────────────────────────────────────────────────────────

/// Variant-specific node invariant violated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidNodeConfiguration {
    #[error("Script node '{node}' has an empty script body")]
    EmptyScript { node: String },

    #[error("Timer node '{node}' must have a non-zero delay")]
    ZeroDelay { node: String },

    #[error("Node '{node}' has an empty evaluator expression")]
    EmptyEvaluator { node: String },

    #[error("Agent node '{node}' has an empty message template")]
    EmptyMessage { node: String },

    #[error("Loop node '{node}' owns an empty body")]
    EmptyLoopBody { node: String },

    #[error("User flow node '{node}' has no fields")]
    EmptyUserFlow { node: String },

    #[error("Subflow node '{node}' owns an empty body")]
    EmptySubflow { node: String },

    #[error("Field '{node}' is not a file field and cannot carry a file mapping")]
    MappingNotAllowed { node: String },

    #[error("Extraction node '{node}' has no configured entities")]
    NoEntities { node: String },

    #[error("Classifier node '{node}' needs at least two classes, found {found}")]
    TooFewClasses { node: String, found: usize },
}

// ─────────────────────────────────────────────────────────────
// Graph construction (eager, per add-operation)
// ─────────────────────────────────────────────────────────────

/// Error raised immediately by a builder add-operation.
#[derive(Error, Debug)]
pub enum FlowBuildError {
    #[error("Duplicate node name '{name}' in flow '{scope}'")]
    DuplicateNodeName { scope: String, name: String },

    #[error("Node name '{name}' is reserved")]
    ReservedNodeName { name: String },

    #[error("Unknown tool '{name}'")]
    UnknownTool { name: String, available: Vec<String> },

    #[error("Unknown agent '{name}'")]
    UnknownAgent { name: String, available: Vec<String> },

    #[error("Node '{name}' does not belong to flow '{scope}'")]
    ForeignHandle { scope: String, name: String },

    #[error("Edges cannot originate from END")]
    EdgeFromEnd,

    #[error("Edges cannot terminate at START")]
    EdgeIntoStart,

    #[error("A sequence needs at least two endpoints, got {found}")]
    SequenceTooShort { found: usize },

    #[error(transparent)]
    InvalidNode(#[from] InvalidNodeConfiguration),
}

impl FixSuggestion for FlowBuildError {
    fn fix_suggestion(&self) -> Option<String> {
        match self {
            FlowBuildError::DuplicateNodeName { .. } => Some(
                "Pick a unique name, or drop the explicit name to let the builder number it".into(),
            ),
            FlowBuildError::ReservedNodeName { .. } => {
                Some("'start' and 'end' are sentinel names; choose another node name".into())
            }
            FlowBuildError::UnknownTool { available, .. } => {
                Some(registry_suggestion("tools", available))
            }
            FlowBuildError::UnknownAgent { available, .. } => {
                Some(registry_suggestion("agents", available))
            }
            FlowBuildError::ForeignHandle { .. } => Some(
                "Handles are scoped: use handles created by the same builder (loop bodies have their own scope)"
                    .into(),
            ),
            _ => None,
        }
    }
}

fn registry_suggestion(what: &str, available: &[String]) -> String {
    if available.is_empty() {
        format!("No {what} registered; register them on the builder first")
    } else if available.len() <= 5 {
        format!("Registered {what}: {}", available.join(", "))
    } else {
        format!(
            "Registered {what}: {} (and {} more)",
            available[..3].join(", "),
            available.len() - 3
        )
    }
}

// ─────────────────────────────────────────────────────────────
// Structural well-formedness (aggregated at compile time)
// ─────────────────────────────────────────────────────────────

/// A single structural violation, tagged with the scope it was found in.
///
/// The scope is the slash-joined path of flow and sub-flow names, e.g.
/// `my_flow/loop_1` for a loop body.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowViolation {
    #[error("scope '{scope}': no edge originates from START")]
    MissingStartEdge { scope: String },

    #[error("scope '{scope}': {found} edges originate from START, expected exactly one")]
    MultipleStartEdges { scope: String, found: usize },

    #[error("scope '{scope}': no edge terminates at END")]
    MissingEndEdge { scope: String },

    #[error("scope '{scope}': {found} edges terminate at END, expected exactly one")]
    MultipleEndEdges { scope: String, found: usize },

    #[error("scope '{scope}': edge references unknown node '{node}'")]
    UnknownEdgeEndpoint { scope: String, node: String },

    #[error("scope '{scope}': node '{node}' is not reachable from START")]
    UnreachableNode { scope: String, node: String },

    #[error("scope '{scope}': branch node '{node}' has {found} outgoing edges, needs at least two")]
    BranchFanout {
        scope: String,
        node: String,
        found: usize,
    },
}

/// Structural graph violation report. Carries every violation found in one
/// validation pass, not just the first.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedFlowError {
    pub violations: Vec<FlowViolation>,
}

impl fmt::Display for MalformedFlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flow is malformed ({} violations)", self.violations.len())?;
        for violation in &self.violations {
            write!(f, "\n  - {violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for MalformedFlowError {}

impl FixSuggestion for MalformedFlowError {
    fn fix_suggestion(&self) -> Option<String> {
        Some(
            "Each scope needs exactly one START edge, exactly one END edge, and every node reachable from START"
                .into(),
        )
    }
}

// ─────────────────────────────────────────────────────────────
// Spec compilation
// ─────────────────────────────────────────────────────────────

/// Two distinct schema shapes want the same registry title.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Schema title '{title}' is already registered with a different shape")]
pub struct SchemaTitleCollisionError {
    pub title: String,
}

impl FixSuggestion for SchemaTitleCollisionError {
    fn fix_suggestion(&self) -> Option<String> {
        Some(format!(
            "Give one of the types sharing the title '{}' a distinct title",
            self.title
        ))
    }
}

/// Any compiler-stage failure. Compilation never partially emits a spec.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Node(#[from] InvalidNodeConfiguration),

    #[error(transparent)]
    Malformed(#[from] MalformedFlowError),

    #[error(transparent)]
    TitleCollision(#[from] SchemaTitleCollisionError),
}

impl FixSuggestion for CompileError {
    fn fix_suggestion(&self) -> Option<String> {
        match self {
            CompileError::Schema(e) => e.fix_suggestion(),
            CompileError::Node(_) => None,
            CompileError::Malformed(e) => e.fix_suggestion(),
            CompileError::TitleCollision(e) => e.fix_suggestion(),
        }
    }
}

// ─────────────────────────────────────────────────────────────
// Remote invocation
// ─────────────────────────────────────────────────────────────

/// Transport or protocol failure talking to the execution engine.
#[derive(Error, Debug, Clone)]
pub enum RemoteInvocationError {
    #[error("Deploy rejected by engine: {message}")]
    Deploy { message: String },

    #[error("Engine transport failure: {0}")]
    Transport(String),

    #[error("Run '{run_id}' failed: {message}")]
    Run { run_id: String, message: String },

    #[error("Run '{run_id}' timed out after {elapsed_secs}s")]
    Timeout { run_id: String, elapsed_secs: u64 },

    #[error("Input payload failed schema validation: {details}")]
    InvalidPayload { details: String },

    #[error("Engine returned a malformed response: {details}")]
    Protocol { details: String },
}

impl FixSuggestion for RemoteInvocationError {
    fn fix_suggestion(&self) -> Option<String> {
        match self {
            RemoteInvocationError::Deploy { .. } => {
                Some("Check the compiled spec with `weft inspect` and the engine logs".into())
            }
            RemoteInvocationError::Transport(_) => {
                Some("Check WEFT_ENGINE_URL and that the engine is reachable".into())
            }
            RemoteInvocationError::Timeout { .. } => {
                Some("Raise the invocation timeout or check the run in the engine console".into())
            }
            RemoteInvocationError::InvalidPayload { .. } => {
                Some("Shape the payload to match the flow's input schema".into())
            }
            _ => None,
        }
    }
}

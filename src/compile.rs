//! Spec compilation: freeze a flow definition into a serializable artifact.
//!
//! The compiled spec is the wire format the execution engine accepts. It is
//! fully self-contained: one flat schema registry, node descriptors pointing
//! into it by `$ref`, and the edge list. Two compilations of the same
//! definition produce byte-identical JSON.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CompileError, SchemaTitleCollisionError};
use crate::flow::FlowDefinition;
use crate::node::{EdgeSpec, NodeKind, NodeSpec, SubflowSpec};
use crate::schema::{
    derive_schema, valid_name, FieldDef, SchemaObject, SchemaRef, TypeDef, TypeRegistry,
};

// ─────────────────────────────────────────────────────────────
// Compiled artifact
// ─────────────────────────────────────────────────────────────

/// Flow-level descriptor at the head of a compiled spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecDescriptor {
    /// Always `"flow"`.
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<SchemaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<SchemaRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_schema: Option<SchemaRef>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub schedulable: bool,
}

/// The deployable artifact produced by [`FlowDefinition::compile`].
///
/// Immutable once built; serialization order follows node insertion order, so
/// repeated compilations of one definition are byte-identical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledSpec {
    pub spec: SpecDescriptor,
    pub schemas: IndexMap<String, SchemaObject>,
    pub nodes: Vec<NodeSpec>,
    pub edges: Vec<EdgeSpec>,
}

impl CompiledSpec {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// The flow's input schema, resolved out of the registry.
    pub fn resolved_input_schema(&self) -> Option<&SchemaObject> {
        let title = self.spec.input_schema.as_ref()?.title()?;
        self.schemas.get(title)
    }
}

// ─────────────────────────────────────────────────────────────
// Compilation
// ─────────────────────────────────────────────────────────────

impl FlowDefinition {
    /// Compile this definition into a [`CompiledSpec`].
    ///
    /// Validates structural well-formedness first, then derives and interns
    /// every schema into one flat registry shared by all nesting levels.
    pub fn compile(&self) -> Result<CompiledSpec, CompileError> {
        crate::validate::check_flow(self)?;

        let mut interner = SchemaInterner::new(&self.types);

        let input_schema = self
            .input
            .as_ref()
            .map(|def| interner.intern(def, &format!("{}_input", self.name)))
            .transpose()?;
        let output_schema = self
            .output
            .as_ref()
            .map(|def| interner.intern(def, &format!("{}_output", self.name)))
            .transpose()?;
        let private_schema = self
            .private
            .as_ref()
            .map(|def| interner.intern(def, &format!("{}_private", self.name)))
            .transpose()?;

        let (nodes, edges) = compile_graph(self, &mut interner)?;

        debug!(
            flow = %self.name,
            nodes = nodes.len(),
            schemas = interner.schemas.len(),
            "compiled flow spec"
        );

        Ok(CompiledSpec {
            spec: SpecDescriptor {
                kind: "flow".to_string(),
                name: self.name.clone(),
                display_name: self.display_name.clone(),
                description: self.description.clone(),
                input_schema,
                output_schema,
                private_schema,
                schedulable: self.schedulable,
            },
            schemas: interner.schemas,
            nodes,
            edges,
        })
    }
}

/// Walk one graph level in insertion order, interning node schemas and
/// recursing into sub-flow bodies.
fn compile_graph(
    def: &FlowDefinition,
    interner: &mut SchemaInterner<'_>,
) -> Result<(Vec<NodeSpec>, Vec<EdgeSpec>), CompileError> {
    let mut nodes = Vec::with_capacity(def.nodes.len());

    for (name, node) in &def.nodes {
        node.validate()?;

        let input_schema = node
            .input
            .as_ref()
            .map(|d| interner.intern(d, &format!("{name}_input")))
            .transpose()?;

        let output_def = node.output.clone().or_else(|| synthesized_output(node));
        let output_schema = output_def
            .as_ref()
            .map(|d| interner.intern(d, &format!("{name}_output")))
            .transpose()?;

        let subflow = match node.body() {
            Some(body) => {
                let (sub_nodes, sub_edges) = compile_graph(body, interner)?;
                Some(SubflowSpec {
                    nodes: sub_nodes,
                    edges: sub_edges,
                })
            }
            None => None,
        };

        nodes.push(node.to_node_spec(input_schema, output_schema, subflow));
    }

    let edges = def
        .edges
        .iter()
        .map(|e| EdgeSpec {
            from: e.from.as_str().to_string(),
            to: e.to.as_str().to_string(),
            guard: e.guard.clone(),
        })
        .collect();

    Ok((nodes, edges))
}

/// Output shape implied by a node's configuration when no explicit output
/// type is given. Extraction nodes produce one string field per entity.
fn synthesized_output(node: &crate::node::Node) -> Option<TypeDef> {
    match &node.kind {
        NodeKind::DocExt { entities, .. } => {
            let fields = entities
                .iter()
                .map(|e| FieldDef::new(valid_name(&e.field_name), TypeDef::string()).required())
                .collect();
            Some(TypeDef::anonymous_object(fields))
        }
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────
// Schema interning
// ─────────────────────────────────────────────────────────────

/// Flat registry builder. Derives schemas, normalizes titles, and
/// deduplicates identical shapes under one title.
struct SchemaInterner<'a> {
    types: &'a TypeRegistry,
    schemas: IndexMap<String, SchemaObject>,
}

impl<'a> SchemaInterner<'a> {
    fn new(types: &'a TypeRegistry) -> Self {
        Self {
            types,
            schemas: IndexMap::new(),
        }
    }

    /// Derive `def`, deposit the result under its title (or `fallback` when
    /// untitled), and return a pointer to the registry entry.
    ///
    /// Depositing the same shape under one title twice is a no-op; a
    /// different shape under an occupied title is a collision.
    fn intern(&mut self, def: &TypeDef, fallback: &str) -> Result<SchemaRef, CompileError> {
        let mut schema = derive_schema(def, self.types)?;
        let title = valid_name(schema.title.as_deref().unwrap_or(fallback));
        schema.title = Some(title.clone());

        match self.schemas.get(&title) {
            Some(existing) if *existing == schema => {}
            Some(_) => return Err(SchemaTitleCollisionError { title }.into()),
            None => {
                self.schemas.insert(title.clone(), schema);
            }
        }
        Ok(SchemaRef::to(&title))
    }
}

//! Weft - flow compiler SDK
//!
//! Build flow graphs with a fluent builder, compile them into deterministic,
//! self-contained specs, and deploy and run them against a remote execution
//! engine.
//!
//! ```no_run
//! use weft::{FlowBuilder, ScriptNode, TypeDef, FieldDef, START, END};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut flow = FlowBuilder::new("greeter")
//!     .input(TypeDef::object(
//!         "Greeting",
//!         vec![FieldDef::new("name", TypeDef::string()).required()],
//!     ));
//! let step = flow.script(ScriptNode::new("message = f'Hello {name}'"))?;
//! flow.sequence([START, step.endpoint(), END])?;
//!
//! let spec = flow.build().compile()?;
//! println!("{}", spec.to_json()?);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod compile;
pub mod error;
pub mod flow;
pub mod node;
pub mod registry;
pub mod run;
pub mod schema;

mod validate;

pub use client::{
    EngineClient, EngineConfig, HttpEngineClient, MockEngineClient, RunState, RunStatusReport,
};
pub use compile::{CompiledSpec, SpecDescriptor};
pub use error::{
    CompileError, FixSuggestion, FlowBuildError, InvalidNodeConfiguration, MalformedFlowError,
    RemoteInvocationError, SchemaError,
};
pub use flow::{Endpoint, FlowBuilder, FlowDefinition, NodeHandle, UserFlowBuilder, END, START};
pub use node::{
    AgentNode, Assignment, BranchNode, DocClassifierNode, DocExtEntity, DocExtNode, DocProcNode,
    ErrorHandlerConfig, FieldDirection, LoopNode, ScriptNode, SubflowNode, TimerNode, ToolNode,
    UserField, UserFieldKind,
};
pub use registry::{
    AgentDescriptor, AgentRegistry, InMemoryAgentRegistry, InMemoryToolRegistry, ToolDescriptor,
    ToolRegistry,
};
pub use run::{deploy, DeployedFlow, FlowRun, InvokeOptions};
pub use schema::{derive_schema, valid_name, FieldDef, SchemaObject, SchemaRef, TypeDef, TypeRegistry};

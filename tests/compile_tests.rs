//! End-to-end compilation scenarios through the public API.

use std::sync::Arc;

use weft::{
    AgentDescriptor, AgentNode, BranchNode, CompileError, CompiledSpec, FieldDef, FlowBuildError,
    FlowBuilder, InMemoryAgentRegistry, InMemoryToolRegistry, LoopNode, ScriptNode, TimerNode,
    ToolDescriptor, ToolNode, TypeDef, UserField, UserFieldKind, END, START,
};

fn registries() -> (Arc<InMemoryToolRegistry>, Arc<InMemoryAgentRegistry>) {
    let tools = InMemoryToolRegistry::new().with(
        ToolDescriptor::new("get_invoice")
            .describe("Fetch an invoice record")
            .input(TypeDef::object(
                "InvoiceQuery",
                vec![FieldDef::new("invoice_id", TypeDef::string()).required()],
            ))
            .output(TypeDef::object(
                "Invoice",
                vec![
                    FieldDef::new("invoice_id", TypeDef::string()).required(),
                    FieldDef::new("total", TypeDef::number()).required(),
                ],
            )),
    );
    let agents = InMemoryAgentRegistry::new()
        .with(AgentDescriptor::new("billing_assistant").describe("Answers billing questions"));
    (Arc::new(tools), Arc::new(agents))
}

#[test]
fn tool_and_agent_flow_compiles_with_schemas() {
    let (tools, agents) = registries();
    let mut flow = FlowBuilder::new("invoice_flow")
        .display_name("Invoice lookup")
        .input(TypeDef::object(
            "InvoiceQuery",
            vec![FieldDef::new("invoice_id", TypeDef::string()).required()],
        ))
        .with_tools(tools)
        .with_agents(agents);

    let fetch = flow.tool(ToolNode::new("get_invoice").name("fetch")).unwrap();
    let explain = flow
        .agent(AgentNode::new("billing_assistant", "Explain invoice {invoice_id}").name("explain"))
        .unwrap();
    flow.sequence([START, fetch.endpoint(), explain.endpoint(), END])
        .unwrap();

    let spec = flow.build().compile().unwrap();

    assert_eq!(spec.spec.name, "invoice_flow");
    assert_eq!(spec.spec.display_name.as_deref(), Some("Invoice lookup"));
    assert_eq!(spec.nodes.len(), 2);
    assert_eq!(spec.nodes[0].name, "fetch");
    assert_eq!(spec.nodes[0].detail.kind(), "tool");
    assert_eq!(spec.nodes[1].name, "explain");
    assert_eq!(spec.nodes[1].detail.kind(), "agent");

    // One flat schema registry shared by flow and nodes.
    assert!(spec.schemas.contains_key("InvoiceQuery"));
    assert!(spec.schemas.contains_key("Invoice"));
    assert_eq!(
        spec.nodes[0].output_schema.as_ref().unwrap().title(),
        Some("Invoice")
    );
}

#[test]
fn repeated_compilation_is_byte_identical() {
    let (tools, agents) = registries();
    let mut flow = FlowBuilder::new("stable")
        .with_tools(tools)
        .with_agents(agents);
    let fetch = flow.tool(ToolNode::new("get_invoice")).unwrap();
    flow.sequence([START, fetch.endpoint(), END]).unwrap();
    let def = flow.build();

    let first = def.compile().unwrap().to_json().unwrap();
    let second = def.compile().unwrap().to_json().unwrap();
    assert_eq!(first, second);
}

#[test]
fn missing_start_edge_names_the_scope() {
    let mut flow = FlowBuilder::new("broken");
    let step = flow.script(ScriptNode::new("x = 1")).unwrap();
    flow.edge(&step, END).unwrap();

    let err = flow.build().compile().unwrap_err();
    let CompileError::Malformed(malformed) = err else {
        panic!("expected a malformed-flow error, got: {err}");
    };
    let rendered = malformed.to_string();
    assert!(rendered.contains("broken"));
    assert!(rendered.contains("START"));
}

#[test]
fn duplicate_node_name_fails_at_add_time() {
    let mut flow = FlowBuilder::new("dupes");
    flow.script(ScriptNode::new("a").name("step")).unwrap();
    let err = flow.script(ScriptNode::new("b").name("step")).unwrap_err();
    assert!(matches!(err, FlowBuildError::DuplicateNodeName { .. }));
}

#[test]
fn unknown_tool_error_suggests_registered_names() {
    let (tools, _) = registries();
    let mut flow = FlowBuilder::new("f").with_tools(tools);
    let err = flow.tool(ToolNode::new("get_invoce")).unwrap_err();

    use weft::FixSuggestion;
    let hint = err.fix_suggestion().unwrap();
    assert!(hint.contains("get_invoice"));
}

#[test]
fn schema_title_collision_is_rejected() {
    let mut flow = FlowBuilder::new("collide")
        .input(TypeDef::object(
            "Record",
            vec![FieldDef::new("id", TypeDef::string())],
        ))
        .output(TypeDef::object(
            "Record",
            vec![FieldDef::new("count", TypeDef::integer())],
        ));
    let step = flow.script(ScriptNode::new("x")).unwrap();
    flow.sequence([START, step.endpoint(), END]).unwrap();

    let err = flow.build().compile().unwrap_err();
    assert!(matches!(err, CompileError::TitleCollision(_)));
    assert!(err.to_string().contains("Record"));
}

#[test]
fn identical_shapes_share_one_registry_entry() {
    let shape = TypeDef::object(
        "Record",
        vec![FieldDef::new("id", TypeDef::string()).required()],
    );
    let mut flow = FlowBuilder::new("share")
        .input(shape.clone())
        .output(shape);
    let step = flow.script(ScriptNode::new("x")).unwrap();
    flow.sequence([START, step.endpoint(), END]).unwrap();

    let spec = flow.build().compile().unwrap();
    assert_eq!(
        spec.schemas.keys().filter(|k| *k == "Record").count(),
        1
    );
    assert_eq!(spec.spec.input_schema, spec.spec.output_schema);
}

#[test]
fn json_round_trip_preserves_everything() {
    let (tools, agents) = registries();
    let mut flow = FlowBuilder::new("rt")
        .with_tools(tools)
        .with_agents(agents);
    let fetch = flow.tool(ToolNode::new("get_invoice")).unwrap();
    let branch = flow.branch(BranchNode::new("self.output.total > 100")).unwrap();
    let cheap = flow.script(ScriptNode::new("tier = 'small'").name("cheap")).unwrap();
    let dear = flow.script(ScriptNode::new("tier = 'large'").name("dear")).unwrap();
    flow.edge(START, &fetch).unwrap();
    flow.edge(&fetch, &branch).unwrap();
    flow.conditional_edge(&branch, &cheap, "false").unwrap();
    flow.conditional_edge(&branch, &dear, "true").unwrap();
    flow.edge(&cheap, &dear).unwrap();
    flow.edge(&dear, END).unwrap();

    let spec = flow.build().compile().unwrap();
    let text = spec.to_json().unwrap();
    let parsed = CompiledSpec::from_json(&text).unwrap();
    assert_eq!(parsed, spec);
    assert_eq!(parsed.edges[2].guard.as_deref(), Some("false"));
}

#[test]
fn loop_body_stays_nested_under_its_node() {
    let mut flow = FlowBuilder::new("looped");
    let retry = flow
        .loop_while(LoopNode::new("attempt < 5").name("retry"), |body| {
            let wait = body.timer(TimerNode::delay_ms(250))?;
            let step = body.script(ScriptNode::new("attempt += 1"))?;
            body.sequence([START, wait.endpoint(), step.endpoint(), END])?;
            Ok(())
        })
        .unwrap();
    flow.sequence([START, retry.endpoint(), END]).unwrap();

    let spec = flow.build().compile().unwrap();
    // Top level holds only the loop node.
    assert_eq!(spec.nodes.len(), 1);

    let json = serde_json::to_value(&spec.nodes[0]).unwrap();
    assert_eq!(json["kind"], "loop");
    let sub_nodes = json["subflow"]["nodes"].as_array().unwrap();
    assert_eq!(sub_nodes.len(), 2);
    assert_eq!(sub_nodes[0]["name"], "timer_1");
    assert_eq!(sub_nodes[1]["name"], "script_1");
}

#[test]
fn userflow_fields_compile_into_nested_spec() {
    let mut flow = FlowBuilder::new("intake");
    let form = flow
        .userflow(|user| {
            let doc = user.field(
                UserField::input("contract", UserFieldKind::File).text("Upload the contract"),
            )?;
            let notes = user.field(UserField::input("notes", UserFieldKind::Text))?;
            user.sequence([START, doc.endpoint(), notes.endpoint(), END])?;
            Ok(())
        })
        .unwrap();
    flow.sequence([START, form.endpoint(), END]).unwrap();

    let spec = flow.build().compile().unwrap();
    let json = serde_json::to_value(&spec.nodes[0]).unwrap();
    assert_eq!(json["kind"], "userflow");
    let fields = json["subflow"]["nodes"].as_array().unwrap();
    assert_eq!(fields[0]["kind"], "field");
    assert_eq!(fields[0]["field_kind"], "file");
    assert_eq!(fields[0]["text"], "Upload the contract");
    assert_eq!(fields[1]["field_kind"], "text");
}

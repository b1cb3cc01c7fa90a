//! Build and compile a small flow: fetch a fact about a number, retrying
//! inside a loop with a timer between attempts, then print the spec JSON.
//!
//! Run with: cargo run --example build_flow

use std::sync::Arc;

use weft::{
    FieldDef, FlowBuilder, LoopNode, TimerNode, ToolDescriptor, ToolNode, TypeDef,
    InMemoryToolRegistry, END, START,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let tools = InMemoryToolRegistry::new().with(
        ToolDescriptor::new("get_number_fact")
            .describe("Look up a trivia fact for a number")
            .input(TypeDef::object(
                "NumberFactRequest",
                vec![FieldDef::new("number", TypeDef::integer()).required()],
            ))
            .output(TypeDef::object(
                "NumberFact",
                vec![FieldDef::new("fact", TypeDef::string()).required()],
            )),
    );

    let mut flow = FlowBuilder::new("number_fact_flow")
        .description("Fetch a trivia fact for a number, with retries")
        .input(TypeDef::object(
            "NumberFactRequest",
            vec![FieldDef::new("number", TypeDef::integer()).required()],
        ))
        .with_tools(Arc::new(tools));

    let fetch_with_retry = flow.loop_while(
        LoopNode::new("self.output.fact == None and attempt < 3").name("fetch_with_retry"),
        |body| {
            let fetch = body.tool(ToolNode::new("get_number_fact"))?;
            let wait = body.timer(TimerNode::delay_ms(2_000).name("cooldown"))?;
            body.sequence([START, fetch.endpoint(), wait.endpoint(), END])?;
            Ok(())
        },
    )?;
    flow.sequence([START, fetch_with_retry.endpoint(), END])?;

    let spec = flow.build().compile()?;
    println!("{}", spec.to_json()?);
    Ok(())
}

//! CLI behavior tests.

use assert_cmd::Command;
use predicates::prelude::*;

use weft::{FieldDef, FlowBuilder, ScriptNode, TypeDef, END, START};

fn spec_fixture() -> String {
    let mut flow = FlowBuilder::new("greeter")
        .description("Says hello")
        .input(TypeDef::object(
            "Greeting",
            vec![FieldDef::new("name", TypeDef::string()).required()],
        ));
    let step = flow.script(ScriptNode::new("message = f'Hello {name}'")).unwrap();
    flow.sequence([START, step.endpoint(), END]).unwrap();
    flow.build().compile().unwrap().to_json().unwrap()
}

#[test]
fn help_lists_subcommands() {
    Command::cargo_bin("weft")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("inspect"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn inspect_prints_flow_summary() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greeter.json");
    std::fs::write(&path, spec_fixture()).unwrap();

    Command::cargo_bin("weft")
        .unwrap()
        .arg("inspect")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("greeter"))
        .stdout(predicate::str::contains("script_1"))
        .stdout(predicate::str::contains("start -> script_1"))
        .stdout(predicate::str::contains("Greeting"));
}

#[test]
fn inspect_reads_yaml_specs() {
    let mut flow = FlowBuilder::new("yaml_flow");
    let step = flow.script(ScriptNode::new("x = 1")).unwrap();
    flow.sequence([START, step.endpoint(), END]).unwrap();
    let yaml = flow.build().compile().unwrap().to_yaml().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flow.yaml");
    std::fs::write(&path, yaml).unwrap();

    Command::cargo_bin("weft")
        .unwrap()
        .arg("inspect")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("yaml_flow"));
}

#[test]
fn inspect_missing_file_fails_with_context() {
    Command::cargo_bin("weft")
        .unwrap()
        .arg("inspect")
        .arg("/nonexistent/flow.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read spec file"));
}

#[test]
fn inspect_rejects_garbage_spec() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{\"not\": \"a spec\"}").unwrap();

    Command::cargo_bin("weft")
        .unwrap()
        .arg("inspect")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid flow spec"));
}

#[test]
fn run_requires_engine_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greeter.json");
    std::fs::write(&path, spec_fixture()).unwrap();

    Command::cargo_bin("weft")
        .unwrap()
        .env_remove("WEFT_ENGINE_URL")
        .arg("run")
        .arg(&path)
        .arg("--input")
        .arg("{\"name\": \"Ada\"}")
        .assert()
        .failure()
        .stderr(predicate::str::contains("WEFT_ENGINE_URL"));
}

#[test]
fn run_rejects_invalid_input_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("greeter.json");
    std::fs::write(&path, spec_fixture()).unwrap();

    Command::cargo_bin("weft")
        .unwrap()
        .arg("run")
        .arg(&path)
        .arg("--input")
        .arg("not json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--input is not valid JSON"));
}

//! Deployment and run-driving scenarios against the scripted mock engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use weft::{
    deploy, FieldDef, FlowBuilder, InvokeOptions, MockEngineClient, RemoteInvocationError,
    RunStatusReport, ScriptNode, TypeDef, END, START,
};

fn compiled_spec() -> weft::CompiledSpec {
    let mut flow = FlowBuilder::new("echo").input(TypeDef::object(
        "EchoInput",
        vec![FieldDef::new("message", TypeDef::string()).required()],
    ));
    let step = flow.script(ScriptNode::new("out = message")).unwrap();
    flow.sequence([START, step.endpoint(), END]).unwrap();
    flow.build().compile().unwrap()
}

fn fast_options() -> InvokeOptions {
    InvokeOptions {
        poll_interval: Duration::from_millis(1),
        ..InvokeOptions::default()
    }
}

#[tokio::test]
async fn successful_run_fires_on_success_exactly_once() {
    let client = Arc::new(MockEngineClient::with_statuses([
        RunStatusReport::pending(),
        RunStatusReport::running(),
        RunStatusReport::succeeded(json!({"out": "hi"})),
    ]));

    let deployed = deploy(client.clone(), &compiled_spec()).await.unwrap();
    let successes = AtomicUsize::new(0);
    let failures = AtomicUsize::new(0);

    let run = deployed
        .invoke(
            json!({"message": "hi"}),
            fast_options(),
            |result| {
                assert_eq!(result["out"], "hi");
                successes.fetch_add(1, Ordering::SeqCst);
            },
            |_| {
                failures.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await
        .unwrap();

    assert!(run.succeeded());
    assert_eq!(run.result.unwrap()["out"], "hi");
    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(failures.load(Ordering::SeqCst), 0);
    assert_eq!(client.run_payloads(), vec![json!({"message": "hi"})]);
}

#[tokio::test]
async fn failed_run_fires_on_failure_with_engine_message() {
    let client = Arc::new(MockEngineClient::with_statuses([
        RunStatusReport::running(),
        RunStatusReport::failed("node script_1 raised"),
    ]));

    let deployed = deploy(client, &compiled_spec()).await.unwrap();
    let failures = AtomicUsize::new(0);

    let run = deployed
        .invoke(
            json!({"message": "hi"}),
            fast_options(),
            |_| panic!("success callback must not fire"),
            |error| {
                assert!(matches!(error, RemoteInvocationError::Run { .. }));
                assert!(error.to_string().contains("script_1"));
                failures.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await
        .unwrap();

    assert!(!run.succeeded());
    assert_eq!(run.error.as_deref(), Some("node script_1 raised"));
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transient_transport_failures_are_retried() {
    let client = MockEngineClient::new();
    client.push_transport_failure("connection reset");
    client.push_transport_failure("connection reset");
    client.push_status(RunStatusReport::succeeded(json!(null)));
    let client = Arc::new(client);

    let deployed = deploy(client, &compiled_spec()).await.unwrap();
    let run = deployed
        .invoke(
            json!({"message": "hi"}),
            fast_options(),
            |_| {},
            |_| panic!("retries should have absorbed the failures"),
        )
        .await
        .unwrap();
    assert!(run.succeeded());
}

#[tokio::test]
async fn exhausted_transport_retries_abandon_the_run() {
    let client = MockEngineClient::new();
    for _ in 0..5 {
        client.push_transport_failure("engine unreachable");
    }
    let client = Arc::new(client);

    let deployed = deploy(client, &compiled_spec()).await.unwrap();
    let failures = AtomicUsize::new(0);

    let run = deployed
        .invoke(
            json!({"message": "hi"}),
            InvokeOptions {
                poll_interval: Duration::from_millis(1),
                max_transport_retries: 2,
                ..InvokeOptions::default()
            },
            |_| panic!("success callback must not fire"),
            |error| {
                assert!(matches!(error, RemoteInvocationError::Transport(_)));
                failures.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await
        .unwrap();

    assert!(!run.succeeded());
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn run_times_out_when_never_terminal() {
    let client = MockEngineClient::new();
    for _ in 0..100 {
        client.push_status(RunStatusReport::running());
    }
    let client = Arc::new(client);

    let deployed = deploy(client, &compiled_spec()).await.unwrap();
    let failures = AtomicUsize::new(0);

    let run = deployed
        .invoke(
            json!({"message": "hi"}),
            InvokeOptions {
                poll_interval: Duration::from_millis(1),
                timeout: Some(Duration::from_millis(20)),
                ..InvokeOptions::default()
            },
            |_| panic!("success callback must not fire"),
            |error| {
                assert!(matches!(error, RemoteInvocationError::Timeout { .. }));
                failures.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await
        .unwrap();

    assert!(!run.succeeded());
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_payload_rejected_before_any_network_call() {
    let client = Arc::new(MockEngineClient::new());
    let deployed = deploy(client.clone(), &compiled_spec()).await.unwrap();

    let err = deployed
        .invoke(
            json!({"wrong_field": 1}),
            fast_options(),
            |_| panic!("success callback must not fire"),
            |_| panic!("failure callback must not fire for local rejection"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RemoteInvocationError::InvalidPayload { .. }));
    assert!(client.run_payloads().is_empty());
}

#[tokio::test]
async fn deploy_failure_propagates() {
    let client = Arc::new(MockEngineClient::new().with_deploy_failure("quota exceeded"));
    let err = deploy(client, &compiled_spec()).await.unwrap_err();
    assert!(matches!(err, RemoteInvocationError::Deploy { .. }));
    assert!(err.to_string().contains("quota exceeded"));
}

#[tokio::test]
async fn deployed_spec_is_recorded_by_mock() {
    let client = Arc::new(MockEngineClient::new());
    let spec = compiled_spec();
    let deployed = deploy(client.clone(), &spec).await.unwrap();

    assert_eq!(deployed.deployment_id(), "deploy-1");
    let recorded = client.deployed_specs();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0], spec);
}

//! Deploying compiled specs and driving remote runs.
//!
//! [`deploy`] submits a spec and returns a [`DeployedFlow`]; `invoke` on that
//! handle validates the payload against the flow's input schema, starts a
//! run, and polls until a terminal state. Completion is reported through
//! exactly-once callbacks, mirroring how the engine delivers flow-end and
//! flow-error events.

use std::sync::Arc;
use std::time::Duration;

use jsonschema::JSONSchema;
use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::client::{EngineClient, RunState};
use crate::compile::CompiledSpec;
use crate::error::RemoteInvocationError;
use crate::schema::SchemaObject;

/// Submit a compiled spec to the engine.
pub async fn deploy(
    client: Arc<dyn EngineClient>,
    spec: &CompiledSpec,
) -> Result<DeployedFlow, RemoteInvocationError> {
    let deployment_id = client.deploy(spec).await?;
    debug!(flow = %spec.spec.name, %deployment_id, "flow deployed");
    Ok(DeployedFlow {
        deployment_id,
        input_schema: spec.resolved_input_schema().cloned(),
        client,
    })
}

/// Handle to a deployed flow, able to start and drive runs.
pub struct DeployedFlow {
    deployment_id: String,
    input_schema: Option<SchemaObject>,
    client: Arc<dyn EngineClient>,
}

impl std::fmt::Debug for DeployedFlow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployedFlow")
            .field("deployment_id", &self.deployment_id)
            .field("input_schema", &self.input_schema)
            .finish_non_exhaustive()
    }
}

/// Knobs for one invocation.
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    /// Ask the engine to record per-node traces.
    pub debug: bool,
    /// Give up after this much wall-clock time; `None` polls forever.
    pub timeout: Option<Duration>,
    pub poll_interval: Duration,
    /// Consecutive transport failures tolerated before the run is abandoned.
    pub max_transport_retries: u32,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            debug: false,
            timeout: None,
            poll_interval: Duration::from_millis(500),
            max_transport_retries: 3,
        }
    }
}

/// Final observed state of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowRun {
    pub run_id: String,
    pub state: RunState,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl FlowRun {
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Succeeded
    }
}

impl DeployedFlow {
    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    /// Run the flow to completion.
    ///
    /// The payload is validated against the flow's input schema before
    /// anything is sent. Exactly one of `on_success` / `on_failure` fires,
    /// exactly once, before this returns; an `Err` is only produced when the
    /// run could not be started at all.
    pub async fn invoke<S, F>(
        &self,
        payload: Value,
        options: InvokeOptions,
        on_success: S,
        on_failure: F,
    ) -> Result<FlowRun, RemoteInvocationError>
    where
        S: FnOnce(&Value),
        F: FnOnce(&RemoteInvocationError),
    {
        if let Some(schema) = &self.input_schema {
            validate_payload(schema, &payload)?;
        }

        let run_id = self
            .client
            .start_run(&self.deployment_id, &payload, options.debug)
            .await?;
        debug!(%run_id, deployment_id = %self.deployment_id, "run started");

        let started = Instant::now();
        let mut transport_failures: u32 = 0;
        let mut retry_delay = options.poll_interval;

        loop {
            sleep(options.poll_interval).await;

            if let Some(timeout) = options.timeout {
                if started.elapsed() >= timeout {
                    let error = RemoteInvocationError::Timeout {
                        run_id: run_id.clone(),
                        elapsed_secs: started.elapsed().as_secs(),
                    };
                    warn!(%run_id, "run timed out");
                    on_failure(&error);
                    return Ok(FlowRun {
                        run_id,
                        state: RunState::Failed,
                        result: None,
                        error: Some(error.to_string()),
                    });
                }
            }

            let report = match self.client.run_status(&run_id).await {
                Ok(report) => {
                    transport_failures = 0;
                    retry_delay = options.poll_interval;
                    report
                }
                Err(transport) => {
                    transport_failures += 1;
                    if transport_failures > options.max_transport_retries {
                        warn!(%run_id, failures = transport_failures, "giving up on run");
                        on_failure(&transport);
                        return Ok(FlowRun {
                            run_id,
                            state: RunState::Failed,
                            result: None,
                            error: Some(transport.to_string()),
                        });
                    }
                    warn!(%run_id, attempt = transport_failures, "status poll failed, retrying");
                    sleep(retry_delay).await;
                    retry_delay *= 2;
                    continue;
                }
            };

            match report.state {
                RunState::Pending | RunState::Running => continue,
                RunState::Succeeded => {
                    let result = report.result.unwrap_or(Value::Null);
                    on_success(&result);
                    return Ok(FlowRun {
                        run_id,
                        state: RunState::Succeeded,
                        result: Some(result),
                        error: None,
                    });
                }
                RunState::Failed => {
                    let message = report
                        .error
                        .unwrap_or_else(|| "engine reported failure without detail".to_string());
                    let error = RemoteInvocationError::Run {
                        run_id: run_id.clone(),
                        message: message.clone(),
                    };
                    on_failure(&error);
                    return Ok(FlowRun {
                        run_id,
                        state: RunState::Failed,
                        result: None,
                        error: Some(message),
                    });
                }
            }
        }
    }
}

/// Check a payload against the flow's input schema before any network call.
fn validate_payload(schema: &SchemaObject, payload: &Value) -> Result<(), RemoteInvocationError> {
    let schema_value =
        serde_json::to_value(schema).map_err(|e| RemoteInvocationError::Protocol {
            details: format!("input schema not serializable: {e}"),
        })?;
    let compiled =
        JSONSchema::compile(&schema_value).map_err(|e| RemoteInvocationError::Protocol {
            details: format!("input schema rejected by validator: {e}"),
        })?;

    if let Err(errors) = compiled.validate(payload) {
        let details = errors
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(RemoteInvocationError::InvalidPayload { details });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{derive_schema, FieldDef, TypeDef, TypeRegistry};

    fn number_schema() -> SchemaObject {
        derive_schema(
            &TypeDef::object(
                "FactRequest",
                vec![FieldDef::new("number", TypeDef::integer()).required()],
            ),
            &TypeRegistry::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_payload_accepted() {
        let payload = serde_json::json!({"number": 42});
        assert!(validate_payload(&number_schema(), &payload).is_ok());
    }

    #[test]
    fn test_missing_required_field_rejected() {
        let payload = serde_json::json!({});
        let err = validate_payload(&number_schema(), &payload).unwrap_err();
        let RemoteInvocationError::InvalidPayload { details } = err else {
            panic!("expected InvalidPayload");
        };
        assert!(details.contains("number"));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let payload = serde_json::json!({"number": "forty-two"});
        assert!(matches!(
            validate_payload(&number_schema(), &payload),
            Err(RemoteInvocationError::InvalidPayload { .. })
        ));
    }
}

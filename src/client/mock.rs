//! Scripted engine client for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::compile::CompiledSpec;
use crate::error::RemoteInvocationError;

use super::{EngineClient, RunStatusReport};

/// Engine client that replays a scripted sequence of status observations.
///
/// Each `run_status` call pops the next scripted entry; once the script is
/// exhausted the run reports success with a null result. Deployed specs and
/// run payloads are recorded for assertions.
pub struct MockEngineClient {
    statuses: Mutex<VecDeque<Result<RunStatusReport, RemoteInvocationError>>>,
    deploy_failure: Option<RemoteInvocationError>,
    deployed: Mutex<Vec<CompiledSpec>>,
    payloads: Mutex<Vec<Value>>,
}

impl MockEngineClient {
    pub fn new() -> Self {
        Self {
            statuses: Mutex::new(VecDeque::new()),
            deploy_failure: None,
            deployed: Mutex::new(Vec::new()),
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn with_statuses(
        statuses: impl IntoIterator<Item = RunStatusReport>,
    ) -> Self {
        let client = Self::new();
        for status in statuses {
            client.push_status(status);
        }
        client
    }

    pub fn push_status(&self, status: RunStatusReport) {
        self.statuses.lock().unwrap().push_back(Ok(status));
    }

    /// Script one transport failure for the next `run_status` call.
    pub fn push_transport_failure(&self, message: impl Into<String>) {
        self.statuses
            .lock()
            .unwrap()
            .push_back(Err(RemoteInvocationError::Transport(message.into())));
    }

    pub fn with_deploy_failure(mut self, message: impl Into<String>) -> Self {
        self.deploy_failure = Some(RemoteInvocationError::Deploy {
            message: message.into(),
        });
        self
    }

    /// Specs accepted by `deploy`, in call order.
    pub fn deployed_specs(&self) -> Vec<CompiledSpec> {
        self.deployed.lock().unwrap().clone()
    }

    /// Payloads passed to `start_run`, in call order.
    pub fn run_payloads(&self) -> Vec<Value> {
        self.payloads.lock().unwrap().clone()
    }
}

impl Default for MockEngineClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EngineClient for MockEngineClient {
    async fn deploy(&self, spec: &CompiledSpec) -> Result<String, RemoteInvocationError> {
        if let Some(failure) = &self.deploy_failure {
            return Err(failure.clone());
        }
        let mut deployed = self.deployed.lock().unwrap();
        deployed.push(spec.clone());
        Ok(format!("deploy-{}", deployed.len()))
    }

    async fn start_run(
        &self,
        deployment_id: &str,
        payload: &Value,
        _debug: bool,
    ) -> Result<String, RemoteInvocationError> {
        let mut payloads = self.payloads.lock().unwrap();
        payloads.push(payload.clone());
        Ok(format!("{deployment_id}-run-{}", payloads.len()))
    }

    async fn run_status(&self, _run_id: &str) -> Result<RunStatusReport, RemoteInvocationError> {
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RunStatusReport::succeeded(Value::Null)))
    }
}

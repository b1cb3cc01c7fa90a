//! HTTP client for a real execution engine.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error};

use crate::compile::CompiledSpec;
use crate::error::RemoteInvocationError;

use super::{EngineClient, EngineConfig, RunState, RunStatusReport};

// ─────────────────────────────────────────────────────────────
// API types
// ─────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct DeployResponse {
    id: String,
}

#[derive(Deserialize)]
struct StartRunResponse {
    run_id: String,
}

#[derive(Deserialize)]
struct RunStatusResponse {
    status: RunState,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

// ─────────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────────

/// Engine client over HTTP.
///
/// Endpoints: `POST /v1/flows` to deploy, `POST /v1/flows/{id}/runs` to
/// start, `GET /v1/runs/{id}` to poll. Requests carry a bearer token when the
/// config has an API key.
pub struct HttpEngineClient {
    client: reqwest::Client,
    config: EngineConfig,
}

impl HttpEngineClient {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.as_str().trim_end_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn read_error_body(response: reqwest::Response) -> String {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if body.is_empty() {
            format!("HTTP {status}")
        } else {
            format!("HTTP {status}: {body}")
        }
    }
}

#[async_trait]
impl EngineClient for HttpEngineClient {
    async fn deploy(&self, spec: &CompiledSpec) -> Result<String, RemoteInvocationError> {
        let url = self.endpoint("/v1/flows");
        debug!(flow = %spec.spec.name, %url, "deploying flow spec");

        let response = self
            .authorize(self.client.post(&url).json(spec))
            .send()
            .await
            .map_err(|e| RemoteInvocationError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let message = Self::read_error_body(response).await;
            error!(flow = %spec.spec.name, %message, "deploy rejected");
            return Err(RemoteInvocationError::Deploy { message });
        }

        let parsed: DeployResponse = response
            .json()
            .await
            .map_err(|e| RemoteInvocationError::Protocol {
                details: format!("deploy response: {e}"),
            })?;
        debug!(deployment_id = %parsed.id, "flow deployed");
        Ok(parsed.id)
    }

    async fn start_run(
        &self,
        deployment_id: &str,
        payload: &Value,
        debug_mode: bool,
    ) -> Result<String, RemoteInvocationError> {
        let url = self.endpoint(&format!("/v1/flows/{deployment_id}/runs"));
        let body = serde_json::json!({ "input": payload, "debug": debug_mode });

        let response = self
            .authorize(self.client.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| RemoteInvocationError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let message = Self::read_error_body(response).await;
            return Err(RemoteInvocationError::Run {
                run_id: String::new(),
                message,
            });
        }

        let parsed: StartRunResponse = response
            .json()
            .await
            .map_err(|e| RemoteInvocationError::Protocol {
                details: format!("start-run response: {e}"),
            })?;
        debug!(run_id = %parsed.run_id, %deployment_id, "run started");
        Ok(parsed.run_id)
    }

    async fn run_status(&self, run_id: &str) -> Result<RunStatusReport, RemoteInvocationError> {
        let url = self.endpoint(&format!("/v1/runs/{run_id}"));

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| RemoteInvocationError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let message = Self::read_error_body(response).await;
            return Err(RemoteInvocationError::Run {
                run_id: run_id.to_string(),
                message,
            });
        }

        let parsed: RunStatusResponse =
            response
                .json()
                .await
                .map_err(|e| RemoteInvocationError::Protocol {
                    details: format!("run-status response: {e}"),
                })?;

        Ok(RunStatusReport {
            state: parsed.status,
            result: parsed.result,
            error: parsed.error,
        })
    }
}

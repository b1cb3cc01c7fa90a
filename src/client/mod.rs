//! Execution-engine clients.
//!
//! The [`EngineClient`] trait abstracts the remote engine behind three
//! operations: deploy a compiled spec, start a run, poll a run's status. The
//! HTTP implementation talks to a real engine; the mock implementation
//! replays scripted statuses for tests.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::compile::CompiledSpec;
use crate::error::RemoteInvocationError;

mod http;
mod mock;

pub use http::HttpEngineClient;
pub use mock::MockEngineClient;

/// Client for an execution engine.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Submit a compiled spec; returns the engine-assigned deployment id.
    async fn deploy(&self, spec: &CompiledSpec) -> Result<String, RemoteInvocationError>;

    /// Start a run of a deployed flow; returns the run id.
    async fn start_run(
        &self,
        deployment_id: &str,
        payload: &Value,
        debug: bool,
    ) -> Result<String, RemoteInvocationError>;

    /// Fetch the current status of a run.
    async fn run_status(&self, run_id: &str) -> Result<RunStatusReport, RemoteInvocationError>;
}

/// Lifecycle state of a remote run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed)
    }
}

/// One status observation of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatusReport {
    pub state: RunState,
    /// Output payload; present once the run succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Engine-reported failure message; present once the run failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunStatusReport {
    pub fn pending() -> Self {
        Self {
            state: RunState::Pending,
            result: None,
            error: None,
        }
    }

    pub fn running() -> Self {
        Self {
            state: RunState::Running,
            result: None,
            error: None,
        }
    }

    pub fn succeeded(result: Value) -> Self {
        Self {
            state: RunState::Succeeded,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: RunState::Failed,
            result: None,
            error: Some(message.into()),
        }
    }
}

/// Connection settings for an HTTP engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub base_url: Url,
    pub api_key: Option<String>,
}

impl EngineConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Read `WEFT_ENGINE_URL` (required) and `WEFT_API_KEY` (optional).
    pub fn from_env() -> anyhow::Result<Self> {
        let raw = std::env::var("WEFT_ENGINE_URL")
            .context("WEFT_ENGINE_URL is not set; point it at the execution engine")?;
        let base_url = Url::parse(&raw)
            .with_context(|| format!("WEFT_ENGINE_URL is not a valid URL: {raw}"))?;
        Ok(Self {
            base_url,
            api_key: std::env::var("WEFT_API_KEY").ok(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_state_terminality() {
        assert!(!RunState::Pending.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Succeeded.is_terminal());
        assert!(RunState::Failed.is_terminal());
    }

    #[test]
    fn test_status_report_deserializes_engine_payload() {
        let report: RunStatusReport = serde_json::from_str(
            r#"{"state": "succeeded", "result": {"text": "42 is the answer"}}"#,
        )
        .unwrap();
        assert_eq!(report.state, RunState::Succeeded);
        assert_eq!(report.result.unwrap()["text"], "42 is the answer");
    }

    #[test]
    fn test_engine_config_builder() {
        let config = EngineConfig::new(Url::parse("http://localhost:4321").unwrap())
            .with_api_key("secret");
        assert_eq!(config.base_url.as_str(), "http://localhost:4321/");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
    }
}

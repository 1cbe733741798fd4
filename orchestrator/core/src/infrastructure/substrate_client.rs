// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Execution Substrate HTTP Client
//!
//! Talks to the durable-execution substrate's HTTP gateway.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Implements the `ExecutionSubstrate` port over HTTP/JSON
//! - **Integration:** Workflow Tracker → substrate gateway
//!
//! # Gateway Contract
//!
//! | Operation | Request | Response |
//! |-----------|---------|----------|
//! | start | `POST /workflows {workflow_type, input}` | `{workflow_id}` |
//! | signal | `POST /workflows/{id}/signals/{name}` payload | `{accepted}` |
//! | query | `GET /workflows/{id}` | `{status, steps, awaiting_signals, context}` |
//!
//! `404` maps to `NotFound`, other `4xx` to `Rejected`, `5xx` and transport
//! failures to `Unavailable`, client timeouts to `Timeout`.
//!
//! [`RetryingSubstrate`] wraps any substrate and retries transient signal
//! failures with exponential backoff.

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::substrate::{ExecutionSubstrate, SignalAck, SubstrateError, SubstrateState};
use crate::domain::workflow::{WorkflowId, WorkflowType};

#[derive(Clone)]
pub struct HttpSubstrateClient {
    http_client: HttpClient,
    endpoint: String,
    timeout_ms: u64,
}

#[derive(Deserialize)]
struct StartResponse {
    workflow_id: String,
}

#[derive(Deserialize)]
struct SignalResponse {
    #[serde(default = "accepted_default")]
    accepted: bool,
}

fn accepted_default() -> bool {
    true
}

impl HttpSubstrateClient {
    pub fn new(endpoint: &str, timeout_ms: u64) -> Result<Self, SubstrateError> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| SubstrateError::Unavailable(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            timeout_ms,
        })
    }

    fn map_transport(&self, err: reqwest::Error) -> SubstrateError {
        if err.is_timeout() {
            SubstrateError::Timeout(self.timeout_ms)
        } else {
            SubstrateError::Unavailable(err.to_string())
        }
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
        workflow_id: Option<&WorkflowId>,
    ) -> Result<reqwest::Response, SubstrateError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        match (status, workflow_id) {
            (StatusCode::NOT_FOUND, Some(id)) => Err(SubstrateError::NotFound(id.clone())),
            (s, _) if s.is_client_error() => Err(SubstrateError::Rejected(format!("{}: {}", s, body))),
            (s, _) => Err(SubstrateError::Unavailable(format!("{}: {}", s, body))),
        }
    }
}

#[async_trait]
impl ExecutionSubstrate for HttpSubstrateClient {
    async fn start(&self, workflow_type: WorkflowType, input: serde_json::Value) -> Result<WorkflowId, SubstrateError> {
        let url = format!("{}/workflows", self.endpoint);
        debug!(url = %url, workflow_type = workflow_type.as_str(), "Starting workflow on substrate");

        let response = self
            .http_client
            .post(&url)
            .json(&serde_json::json!({
                "workflow_type": workflow_type.as_str(),
                "input": input,
            }))
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let body: StartResponse = self
            .check_status(response, None)
            .await?
            .json()
            .await
            .map_err(|e| SubstrateError::Unavailable(format!("invalid start response: {}", e)))?;

        Ok(WorkflowId::from_string(body.workflow_id))
    }

    async fn signal(
        &self,
        workflow_id: &WorkflowId,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<SignalAck, SubstrateError> {
        let url = format!("{}/workflows/{}/signals/{}", self.endpoint, workflow_id, name);
        let response = self
            .http_client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let body: SignalResponse = self
            .check_status(response, Some(workflow_id))
            .await?
            .json()
            .await
            .unwrap_or(SignalResponse { accepted: true });

        Ok(SignalAck {
            workflow_id: workflow_id.clone(),
            signal: name.to_string(),
            accepted: body.accepted,
        })
    }

    async fn query(&self, workflow_id: &WorkflowId) -> Result<SubstrateState, SubstrateError> {
        let url = format!("{}/workflows/{}", self.endpoint, workflow_id);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        self.check_status(response, Some(workflow_id))
            .await?
            .json()
            .await
            .map_err(|e| SubstrateError::Unavailable(format!("invalid query response: {}", e)))
    }
}

/// Decorator adding bounded exponential-backoff retries to signal delivery.
///
/// Only transient failures (`Unavailable`, `Timeout`) are retried; the
/// substrate guarantees at-least-once delivery, so a retried signal that did
/// land the first time is deduplicated there.
pub struct RetryingSubstrate {
    inner: Arc<dyn ExecutionSubstrate>,
    max_retries: u32,
    retry_delay_ms: u64,
}

impl RetryingSubstrate {
    pub fn new(inner: Arc<dyn ExecutionSubstrate>, max_retries: u32, retry_delay_ms: u64) -> Self {
        Self {
            inner,
            max_retries,
            retry_delay_ms,
        }
    }
}

#[async_trait]
impl ExecutionSubstrate for RetryingSubstrate {
    async fn start(&self, workflow_type: WorkflowType, input: serde_json::Value) -> Result<WorkflowId, SubstrateError> {
        self.inner.start(workflow_type, input).await
    }

    async fn signal(
        &self,
        workflow_id: &WorkflowId,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<SignalAck, SubstrateError> {
        let mut attempt = 0;
        loop {
            match self.inner.signal(workflow_id, name, payload.clone()).await {
                Ok(ack) => {
                    if attempt > 0 {
                        info!(workflow_id = %workflow_id, signal = name, "Signal delivered on attempt {}", attempt + 1);
                    }
                    return Ok(ack);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    warn!(
                        workflow_id = %workflow_id,
                        signal = name,
                        "Signal delivery failed (attempt {}/{}): {}",
                        attempt + 1,
                        self.max_retries + 1,
                        e
                    );
                    // Exponential backoff
                    tokio::time::sleep(Duration::from_millis(self.retry_delay_ms * 2_u64.pow(attempt))).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn query(&self, workflow_id: &WorkflowId) -> Result<SubstrateState, SubstrateError> {
        self.inner.query(workflow_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::WorkflowStatus;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures_left: AtomicU32,
        calls: AtomicU32,
        error: fn() -> SubstrateError,
    }

    #[async_trait]
    impl ExecutionSubstrate for Flaky {
        async fn start(&self, _: WorkflowType, _: serde_json::Value) -> Result<WorkflowId, SubstrateError> {
            Ok(WorkflowId::new())
        }

        async fn signal(&self, id: &WorkflowId, name: &str, _: serde_json::Value) -> Result<SignalAck, SubstrateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err((self.error)());
            }
            Ok(SignalAck {
                workflow_id: id.clone(),
                signal: name.to_string(),
                accepted: true,
            })
        }

        async fn query(&self, _: &WorkflowId) -> Result<SubstrateState, SubstrateError> {
            Err(SubstrateError::Unavailable("unused".into()))
        }
    }

    fn flaky(failures: u32, error: fn() -> SubstrateError) -> Arc<Flaky> {
        Arc::new(Flaky {
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            error,
        })
    }

    #[tokio::test]
    async fn test_retries_transient_failures() {
        let inner = flaky(2, || SubstrateError::Unavailable("503".into()));
        let substrate = RetryingSubstrate::new(inner.clone(), 3, 1);
        let ack = substrate
            .signal(&WorkflowId::from_string("wf-1"), "approve", serde_json::json!({}))
            .await
            .unwrap();
        assert!(ack.accepted);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_bounded_retries() {
        let inner = flaky(10, || SubstrateError::Timeout(5));
        let substrate = RetryingSubstrate::new(inner.clone(), 2, 1);
        let err = substrate
            .signal(&WorkflowId::from_string("wf-1"), "cancel", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, SubstrateError::Timeout(_)));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_rejections() {
        let inner = flaky(1, || SubstrateError::Rejected("409".into()));
        let substrate = RetryingSubstrate::new(inner.clone(), 3, 1);
        assert!(substrate
            .signal(&WorkflowId::from_string("wf-1"), "approve", serde_json::json!({}))
            .await
            .is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_http_query_and_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/workflows/wf-7")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"status":"waiting","steps":[],"awaiting_signals":["approve"],"context":{"k":1}}"#)
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/workflows/wf-404")
            .with_status(404)
            .create_async()
            .await;

        let client = HttpSubstrateClient::new(&server.url(), 2_000).unwrap();
        let state = client.query(&WorkflowId::from_string("wf-7")).await.unwrap();
        assert_eq!(state.status, WorkflowStatus::Waiting);
        assert_eq!(state.awaiting_signals, vec!["approve".to_string()]);

        let err = client.query(&WorkflowId::from_string("wf-404")).await.unwrap_err();
        assert!(matches!(err, SubstrateError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_http_signal_server_error_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/workflows/wf-1/signals/approve")
            .with_status(503)
            .create_async()
            .await;

        let client = HttpSubstrateClient::new(&server.url(), 2_000).unwrap();
        let err = client
            .signal(&WorkflowId::from_string("wf-1"), "approve", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_http_start_returns_workflow_id() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/workflows")
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"workflow_id":"wf-new"}"#)
            .create_async()
            .await;

        let client = HttpSubstrateClient::new(&server.url(), 2_000).unwrap();
        let id = client
            .start(WorkflowType::ValidationRun, serde_json::json!({"dataset": "sample-policy"}))
            .await
            .unwrap();
        assert_eq!(id.as_str(), "wf-new");
    }
}

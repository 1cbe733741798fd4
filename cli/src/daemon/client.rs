// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for communicating with daemon API

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use goldthread_core::application::{SignalOutcome, WorkflowPage};
use goldthread_core::domain::golden::{GoldenDataset, GoldenRun};
use goldthread_core::domain::telemetry::{AlertItem, EvidenceSnapshot};
use goldthread_core::domain::workflow::WorkflowDetail;

/// Error body returned by every daemon endpoint.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    kind: String,
    message: String,
    #[serde(default)]
    ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DaemonClient {
    client: Client,
    base_url: String,
}

impl DaemonClient {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        // Golden runs can take up to the configured run timeout.
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}:{}", host.trim_end_matches('/'), port)
        } else {
            format!("http://{}:{}", host, port)
        };

        Ok(Self { client, base_url })
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().build().context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<serde_json::Value> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_millis(500))
            .send()
            .await
            .context("Daemon is not reachable")?;
        decode(response, "health check").await
    }

    pub async fn list_workflows(&self, status: Option<&str>, limit: usize, offset: usize) -> Result<WorkflowPage> {
        let mut query: Vec<(&str, String)> = vec![("limit", limit.to_string()), ("offset", offset.to_string())];
        if let Some(status) = status {
            query.push(("status", status.to_string()));
        }
        let response = self
            .client
            .get(format!("{}/workflows", self.base_url))
            .query(&query)
            .send()
            .await
            .context("Failed to list workflows")?;
        decode(response, "list workflows").await
    }

    pub async fn get_workflow(&self, id: &str) -> Result<WorkflowDetail> {
        let response = self
            .client
            .get(format!("{}/workflows/{}", self.base_url, id))
            .send()
            .await
            .context("Failed to get workflow")?;
        decode(response, "get workflow").await
    }

    pub async fn signal_workflow(&self, id: &str, signal: &str, payload: serde_json::Value) -> Result<SignalOutcome> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct SignalRequest<'a> {
            signal_name: &'a str,
            payload: serde_json::Value,
        }

        let response = self
            .client
            .post(format!("{}/workflows/{}/signal", self.base_url, id))
            .json(&SignalRequest {
                signal_name: signal,
                payload,
            })
            .send()
            .await
            .context("Failed to signal workflow")?;
        decode(response, "signal workflow").await
    }

    pub async fn list_datasets(&self) -> Result<Vec<GoldenDataset>> {
        #[derive(Deserialize)]
        struct DatasetsResponse {
            datasets: Vec<GoldenDataset>,
        }

        let response = self
            .client
            .get(format!("{}/validation/datasets", self.base_url))
            .send()
            .await
            .context("Failed to list datasets")?;
        let body: DatasetsResponse = decode(response, "list datasets").await?;
        Ok(body.datasets)
    }

    pub async fn run_validation(&self, dataset_id: &str, mode: &str) -> Result<GoldenRun> {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct RunRequest<'a> {
            dataset_id: &'a str,
            mode: &'a str,
        }

        let response = self
            .client
            .post(format!("{}/validation/run", self.base_url))
            .json(&RunRequest { dataset_id, mode })
            .send()
            .await
            .context("Failed to start golden run")?;
        decode(response, "golden run").await
    }

    pub async fn latest_run(&self) -> Result<Option<GoldenRun>> {
        let response = self
            .client
            .get(format!("{}/validation/runs/latest", self.base_url))
            .send()
            .await
            .context("Failed to get latest run")?;
        decode(response, "latest run").await
    }

    pub async fn list_runs(&self, limit: usize) -> Result<Vec<GoldenRun>> {
        #[derive(Deserialize)]
        struct RunsResponse {
            runs: Vec<GoldenRun>,
        }

        let response = self
            .client
            .get(format!("{}/validation/runs", self.base_url))
            .query(&[("limit", limit.to_string())])
            .send()
            .await
            .context("Failed to list golden runs")?;
        let body: RunsResponse = decode(response, "list runs").await?;
        Ok(body.runs)
    }

    pub async fn get_run(&self, run_id: &str) -> Result<GoldenRun> {
        let response = self
            .client
            .get(format!("{}/validation/runs/{}", self.base_url, run_id))
            .send()
            .await
            .context("Failed to get golden run")?;
        decode(response, "get run").await
    }

    pub async fn evidence(&self, range: &str) -> Result<EvidenceSnapshot> {
        let response = self
            .client
            .get(format!("{}/metrics/evidence", self.base_url))
            .query(&[("range", range)])
            .send()
            .await
            .context("Failed to get evidence snapshot")?;
        decode(response, "evidence snapshot").await
    }

    pub async fn alert_history(&self) -> Result<Vec<AlertItem>> {
        #[derive(Deserialize)]
        struct AlertsResponse {
            alerts: Vec<AlertItem>,
        }

        let response = self
            .client
            .get(format!("{}/metrics/alerts", self.base_url))
            .send()
            .await
            .context("Failed to get alert history")?;
        let body: AlertsResponse = decode(response, "alert history").await?;
        Ok(body.alerts)
    }
}

async fn decode<T: DeserializeOwned>(response: Response, action: &str) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiErrorBody>(&text) {
            Ok(body) if body.ids.is_empty() => anyhow::bail!("{} failed ({}): {}", action, body.kind, body.message),
            Ok(body) => anyhow::bail!(
                "{} failed ({}): {} [{}]",
                action,
                body.kind,
                body.message,
                body.ids.join(", ")
            ),
            Err(_) => anyhow::bail!("{} failed: HTTP {} {}", action, status, text),
        }
    }
    response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", action))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_error_body_surfaces_kind_and_ids() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/workflows/wf-123/signal")
            .with_status(409)
            .with_header("content-type", "application/json")
            .with_body(r#"{"kind":"invalid_state","message":"wf-123: not accepted","ids":["wf-123"]}"#)
            .create_async()
            .await;

        let client = DaemonClient::with_base_url(server.url()).unwrap();
        let err = client
            .signal_workflow("wf-123", "approve", serde_json::json!({}))
            .await
            .unwrap_err()
            .to_string();

        assert!(err.contains("invalid_state"));
        assert!(err.contains("[wf-123]"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_latest_run_may_be_absent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/validation/runs/latest")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("null")
            .create_async()
            .await;

        let client = DaemonClient::with_base_url(server.url()).unwrap();
        assert!(client.latest_run().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_runs_sends_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/validation/runs")
            .match_query(mockito::Matcher::UrlEncoded("limit".into(), "5".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"runs":[]}"#)
            .create_async()
            .await;

        let client = DaemonClient::with_base_url(server.url()).unwrap();
        assert!(client.list_runs(5).await.unwrap().is_empty());
        mock.assert_async().await;
    }

    #[test]
    fn test_base_url_accepts_scheme() {
        let client = DaemonClient::new("https://ops.internal", 8400).unwrap();
        assert_eq!(client.base_url(), "https://ops.internal:8400");
        let client = DaemonClient::new("127.0.0.1", 8400).unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8400");
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Collaborator HTTP Adapters
//!
//! JSON-over-HTTP implementations of the capability ports the golden
//! thread exercises. Each adapter is deliberately thin: no caching, no
//! retries. A failing collaborator must show up as a failing check.
//!
//! | Adapter | Endpoints |
//! |---------|-----------|
//! | [`HttpAuthGateway`] | `POST /authenticate` |
//! | [`HttpIngestionService`] | `POST /ingest?filename=&provenance=` |
//! | [`HttpMemoryStore`] | `POST /facts`, `GET /search?q=`, `GET /episodes/{session}` |
//! | [`HttpConversationService`] | `POST /sessions/{session}/turns` |
//! | [`HttpOutputGate`] | `POST /review` |

use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::capabilities::{
    AuthGateway, CapabilityError, Collaborators, ConversationReply, ConversationService, Episode, GateVerdict,
    IngestReceipt, IngestionService, InputProvenance, MemoryStore, OutputGate, SearchHit, WriteReceipt,
};
use crate::domain::node_config::CollaboratorsConfig;

/// Shared plumbing for one collaborator endpoint.
#[derive(Clone)]
struct ServiceClient {
    service: &'static str,
    base: String,
    http: HttpClient,
}

impl ServiceClient {
    fn new(service: &'static str, base: &str, http: HttpClient) -> Self {
        Self {
            service,
            base: base.trim_end_matches('/').to_string(),
            http,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn transport(&self, err: reqwest::Error) -> CapabilityError {
        if err.is_timeout() {
            CapabilityError::Timeout {
                service: self.service.to_string(),
            }
        } else {
            CapabilityError::unavailable(self.service, err)
        }
    }

    async fn decode<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T, CapabilityError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::unavailable(
                self.service,
                format!("HTTP {} {}", status.as_u16(), body.trim()),
            ));
        }
        response.json().await.map_err(|e| CapabilityError::InvalidResponse {
            service: self.service.to_string(),
            reason: e.to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, CapabilityError> {
        let response = self
            .http
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        self.decode(response).await
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: &serde_json::Value) -> Result<T, CapabilityError> {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport(e))?;
        self.decode(response).await
    }
}

pub struct HttpAuthGateway {
    client: ServiceClient,
}

#[async_trait]
impl AuthGateway for HttpAuthGateway {
    async fn authenticate(&self, credentials: Option<&str>) -> Result<bool, CapabilityError> {
        let mut request = self.client.http.post(self.client.url("/authenticate"));
        if let Some(token) = credentials {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|e| self.client.transport(e))?;
        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Ok(false),
            s => Err(CapabilityError::unavailable(self.client.service, format!("HTTP {}", s.as_u16()))),
        }
    }
}

pub struct HttpIngestionService {
    client: ServiceClient,
}

#[async_trait]
impl IngestionService for HttpIngestionService {
    async fn ingest(&self, filename: &str, bytes: &[u8], provenance: InputProvenance) -> Result<IngestReceipt, CapabilityError> {
        let provenance = match provenance {
            InputProvenance::Seeded => "seeded",
            InputProvenance::Live => "live",
        };
        let response = self
            .client
            .http
            .post(self.client.url("/ingest"))
            .query(&[("filename", filename), ("provenance", provenance)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| self.client.transport(e))?;
        self.client.decode(response).await
    }
}

pub struct HttpMemoryStore {
    client: ServiceClient,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Vec<SearchHit>,
}

#[async_trait]
impl MemoryStore for HttpMemoryStore {
    async fn write_facts(&self, session_id: &str, chunks: &[String]) -> Result<WriteReceipt, CapabilityError> {
        self.client
            .post_json("/facts", &serde_json::json!({ "session_id": session_id, "chunks": chunks }))
            .await
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, CapabilityError> {
        let response: SearchResponse = self.client.get_json("/search", &[("q", query)]).await?;
        Ok(response.hits)
    }

    async fn get_episode(&self, session_id: &str) -> Result<Episode, CapabilityError> {
        self.client.get_json(&format!("/episodes/{}", session_id), &[]).await
    }
}

pub struct HttpConversationService {
    client: ServiceClient,
}

#[async_trait]
impl ConversationService for HttpConversationService {
    async fn converse(&self, session_id: &str, message: &str) -> Result<ConversationReply, CapabilityError> {
        self.client
            .post_json(
                &format!("/sessions/{}/turns", session_id),
                &serde_json::json!({ "message": message }),
            )
            .await
    }
}

pub struct HttpOutputGate {
    client: ServiceClient,
}

#[derive(Deserialize)]
struct ReviewResponse {
    verdict: GateVerdict,
}

#[async_trait]
impl OutputGate for HttpOutputGate {
    async fn review(&self, session_id: &str, candidate: &str) -> Result<GateVerdict, CapabilityError> {
        let response: ReviewResponse = self
            .client
            .post_json("/review", &serde_json::json!({ "session_id": session_id, "candidate": candidate }))
            .await?;
        Ok(response.verdict)
    }
}

/// Build the full collaborator bundle from configuration.
pub fn http_collaborators(config: &CollaboratorsConfig) -> Result<Collaborators, CapabilityError> {
    let http = HttpClient::builder()
        .timeout(Duration::from_millis(config.timeout_ms))
        .build()
        .map_err(|e| CapabilityError::unavailable("http client", e))?;

    Ok(Collaborators {
        auth: Arc::new(HttpAuthGateway {
            client: ServiceClient::new("auth gateway", &config.auth_endpoint, http.clone()),
        }),
        ingestion: Arc::new(HttpIngestionService {
            client: ServiceClient::new("ingestion service", &config.ingestion_endpoint, http.clone()),
        }),
        memory: Arc::new(HttpMemoryStore {
            client: ServiceClient::new("memory store", &config.memory_endpoint, http.clone()),
        }),
        conversation: Arc::new(HttpConversationService {
            client: ServiceClient::new("conversation service", &config.conversation_endpoint, http.clone()),
        }),
        gate: Arc::new(HttpOutputGate {
            client: ServiceClient::new("output gate", &config.gate_endpoint, http),
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(url: &str) -> CollaboratorsConfig {
        CollaboratorsConfig {
            auth_endpoint: url.to_string(),
            ingestion_endpoint: url.to_string(),
            memory_endpoint: url.to_string(),
            conversation_endpoint: url.to_string(),
            gate_endpoint: url.to_string(),
            timeout_ms: 2_000,
        }
    }

    #[tokio::test]
    async fn test_auth_distinguishes_rejection_from_outage() {
        let mut server = mockito::Server::new_async().await;
        let _anon = server
            .mock("POST", "/authenticate")
            .match_header("authorization", mockito::Matcher::Missing)
            .with_status(401)
            .create_async()
            .await;
        let _ok = server
            .mock("POST", "/authenticate")
            .match_header("authorization", "Bearer probe")
            .with_status(200)
            .create_async()
            .await;

        let collaborators = http_collaborators(&config_for(&server.url())).unwrap();
        assert!(!collaborators.auth.authenticate(None).await.unwrap());
        assert!(collaborators.auth.authenticate(Some("probe")).await.unwrap());
    }

    #[tokio::test]
    async fn test_ingest_error_surfaces_status() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/ingest")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .with_body("parser crashed")
            .create_async()
            .await;

        let collaborators = http_collaborators(&config_for(&server.url())).unwrap();
        let err = collaborators
            .ingestion
            .ingest("policy.md", b"text", InputProvenance::Seeded)
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("ingestion service"));
        assert!(message.contains("500"));
    }

    #[tokio::test]
    async fn test_memory_search_and_gate_verdict() {
        let mut server = mockito::Server::new_async().await;
        let _search = server
            .mock("GET", "/search")
            .match_query(mockito::Matcher::UrlEncoded("q".into(), "retention policy".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"hits":[{"fact_id":"f1","source":"policy.md","score":0.92}]}"#)
            .create_async()
            .await;
        let _review = server
            .mock("POST", "/review")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"verdict":"rejected"}"#)
            .create_async()
            .await;

        let collaborators = http_collaborators(&config_for(&server.url())).unwrap();
        let hits = collaborators.memory.search("retention policy").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "policy.md");

        let verdict = collaborators.gate.review("s-1", "bad").await.unwrap();
        assert_eq!(verdict, GateVerdict::Rejected);
    }
}

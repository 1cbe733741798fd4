// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # External Capabilities
//!
//! Narrow contracts for the collaborators a golden run exercises. None of
//! these are implemented here: ingestion, memory, conversation,
//! authentication and output review all live in other services and are
//! reached through `infrastructure::collaborators`.
//!
//! | Trait | Used by check |
//! |-------|---------------|
//! | [`AuthGateway`] | `auth_gate` |
//! | [`IngestionService`] | `ingest_document` |
//! | [`MemoryStore`] | `index_chunks`, `memory_search`, `episode_transcript` |
//! | [`ConversationService`] | `grounded_answer` |
//! | [`OutputGate`] | `validation_gate` |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Whether inputs come from seeded fixtures or live sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputProvenance {
    Seeded,
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReceipt {
    pub chunk_count: usize,
    #[serde(default)]
    pub chunks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteReceipt {
    pub fact_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub fact_id: String,
    pub source: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub session_id: String,
    pub transcript: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationReply {
    pub response_text: String,
    pub cited_sources: Vec<String>,
}

/// Outcome of handing an intermediate result to the output gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateVerdict {
    Passed,
    Rewritten,
    Rejected,
}

#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// `None` credentials model an unauthenticated caller.
    async fn authenticate(&self, credentials: Option<&str>) -> Result<bool, CapabilityError>;
}

#[async_trait]
pub trait IngestionService: Send + Sync {
    async fn ingest(&self, filename: &str, bytes: &[u8], provenance: InputProvenance) -> Result<IngestReceipt, CapabilityError>;
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn write_facts(&self, session_id: &str, chunks: &[String]) -> Result<WriteReceipt, CapabilityError>;

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, CapabilityError>;

    async fn get_episode(&self, session_id: &str) -> Result<Episode, CapabilityError>;
}

#[async_trait]
pub trait ConversationService: Send + Sync {
    async fn converse(&self, session_id: &str, message: &str) -> Result<ConversationReply, CapabilityError>;
}

#[async_trait]
pub trait OutputGate: Send + Sync {
    async fn review(&self, session_id: &str, candidate: &str) -> Result<GateVerdict, CapabilityError>;
}

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("{service} unavailable: {reason}")]
    Unavailable { service: String, reason: String },

    #[error("{service} timed out")]
    Timeout { service: String },

    #[error("{service} returned an invalid response: {reason}")]
    InvalidResponse { service: String, reason: String },
}

impl CapabilityError {
    pub fn unavailable(service: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            service: service.into(),
            reason: reason.to_string(),
        }
    }
}

/// Every collaborator a golden run needs, bundled for injection.
#[derive(Clone)]
pub struct Collaborators {
    pub auth: Arc<dyn AuthGateway>,
    pub ingestion: Arc<dyn IngestionService>,
    pub memory: Arc<dyn MemoryStore>,
    pub conversation: Arc<dyn ConversationService>,
    pub gate: Arc<dyn OutputGate>,
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP API
//!
//! | Method | Path | Service call |
//! |--------|------|--------------|
//! | GET | `/health` | uptime |
//! | GET | `/workflows?status=&limit=&offset=` | [`WorkflowTracker::list`] |
//! | POST | `/workflows` | [`WorkflowTracker::start`] |
//! | GET | `/workflows/{id}` | [`WorkflowTracker::detail`] |
//! | POST | `/workflows/{id}/signal` | [`WorkflowTracker::signal`] |
//! | POST | `/workflows/{id}/events` | [`WorkflowTracker::apply_step_event`] |
//! | GET | `/validation/datasets` | [`GoldenThreadService::list_datasets`] |
//! | POST | `/validation/run` | [`GoldenThreadService::run`] |
//! | GET | `/validation/runs?limit=` | [`GoldenThreadService::list_runs`] |
//! | GET | `/validation/runs/latest` | [`GoldenThreadService::latest_run`] |
//! | GET | `/validation/runs/{id}` | [`GoldenThreadService::get_run`] |
//! | GET | `/metrics/evidence?range=` | [`EvidenceTelemetryService::snapshot`] |
//! | GET | `/metrics/alerts` | [`EvidenceTelemetryService::alert_history`] |
//! | POST | `/metrics/samples` | [`InMemoryMetricsFeed::record_at`] |
//!
//! Errors render as `{"kind", "message", "ids"}` with the status code of
//! their kind.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::application::{
    EvidenceTelemetryService, GoldenThreadService, SignalOutcome, StartWorkflowRequest, StepEvent, WorkflowPage,
    WorkflowTracker,
};
use crate::domain::error::{ErrorKind, ServiceError};
use crate::domain::golden::{GoldenError, GoldenRun, RunMode};
use crate::domain::telemetry::{EvidenceSnapshot, MetricKey, RangeLabel, TelemetryError};
use crate::domain::workflow::{WorkflowDetail, WorkflowId, WorkflowStatus};
use crate::infrastructure::metrics_feed::InMemoryMetricsFeed;

const DEFAULT_PAGE_SIZE: usize = 20;
const DEFAULT_RUN_HISTORY: usize = 10;

pub struct AppState {
    pub tracker: Arc<WorkflowTracker>,
    pub golden_thread: Arc<GoldenThreadService>,
    pub telemetry: Arc<EvidenceTelemetryService>,
    pub samples: Arc<InMemoryMetricsFeed>,
    pub start_time: Instant,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/workflows", get(list_workflows_handler).post(start_workflow_handler))
        .route("/workflows/{id}", get(get_workflow_handler))
        .route("/workflows/{id}/signal", post(signal_workflow_handler))
        .route("/workflows/{id}/events", post(step_event_handler))
        .route("/validation/datasets", get(list_datasets_handler))
        .route("/validation/run", post(run_validation_handler))
        .route("/validation/runs", get(list_runs_handler))
        .route("/validation/runs/latest", get(latest_run_handler))
        .route("/validation/runs/{id}", get(get_run_handler))
        .route("/metrics/evidence", get(evidence_handler))
        .route("/metrics/samples", post(record_samples_handler))
        .route("/metrics/alerts", get(alert_history_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Error body shared by every endpoint.
#[derive(Debug)]
pub enum ApiError {
    Service(ServiceError),
    BadRequest(String),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self::Service(err)
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidState | ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::Service(err) => (
                status_for(err.kind()),
                json!({ "kind": err.kind(), "message": err.to_string(), "ids": err.ids() }),
            ),
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                json!({ "kind": "bad_request", "message": message, "ids": [] }),
            ),
        };
        debug!(status = status.as_u16(), "Request failed: {}", body);
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
struct ListWorkflowsQuery {
    status: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_workflows_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListWorkflowsQuery>,
) -> ApiResult<WorkflowPage> {
    let status = query
        .status
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<WorkflowStatus>())
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let page = state
        .tracker
        .list(status, query.limit.unwrap_or(DEFAULT_PAGE_SIZE), query.offset.unwrap_or(0))
        .await?;
    Ok(Json(page))
}

async fn start_workflow_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartWorkflowRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let workflow = state.tracker.start(request).await?;
    Ok((StatusCode::CREATED, Json(json!(workflow.summary()))))
}

async fn get_workflow_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<WorkflowDetail> {
    let detail = state.tracker.detail(&WorkflowId::from_string(id)).await?;
    Ok(Json(detail))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignalRequest {
    #[serde(alias = "signal_name")]
    signal_name: String,
    #[serde(default)]
    payload: serde_json::Value,
}

async fn signal_workflow_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<SignalRequest>,
) -> ApiResult<SignalOutcome> {
    let outcome = state
        .tracker
        .signal(&WorkflowId::from_string(id), &request.signal_name, request.payload)
        .await?;
    Ok(Json(outcome))
}

async fn step_event_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(event): Json<StepEvent>,
) -> ApiResult<WorkflowDetail> {
    let workflow = state.tracker.apply_step_event(&WorkflowId::from_string(id), event).await?;
    Ok(Json((&workflow).into()))
}

async fn list_datasets_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "datasets": state.golden_thread.list_datasets() }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunRequest {
    #[serde(alias = "dataset_id")]
    dataset_id: String,
    #[serde(default)]
    mode: Option<String>,
}

async fn run_validation_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let mode = match request.mode.as_deref() {
        None | Some("") => RunMode::Deterministic,
        Some(mode) => mode.parse().map_err(|e: GoldenError| ApiError::BadRequest(e.to_string()))?,
    };
    let run = state.golden_thread.run(&request.dataset_id, mode).await?;
    Ok((StatusCode::CREATED, Json(json!(run))))
}

#[derive(Debug, Deserialize)]
struct ListRunsQuery {
    limit: Option<usize>,
}

async fn list_runs_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListRunsQuery>,
) -> ApiResult<serde_json::Value> {
    let runs = state
        .golden_thread
        .list_runs(query.limit.unwrap_or(DEFAULT_RUN_HISTORY))
        .await?;
    Ok(Json(json!({ "runs": runs })))
}

async fn latest_run_handler(State(state): State<Arc<AppState>>) -> ApiResult<Option<GoldenRun>> {
    Ok(Json(state.golden_thread.latest_run().await?))
}

async fn get_run_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<GoldenRun> {
    Ok(Json(state.golden_thread.get_run(&id).await?))
}

#[derive(Debug, Deserialize)]
struct EvidenceQuery {
    range: Option<String>,
}

async fn evidence_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EvidenceQuery>,
) -> ApiResult<EvidenceSnapshot> {
    let range = match query.range.as_deref() {
        None | Some("") => RangeLabel::default(),
        Some(label) => label.parse().map_err(|e: TelemetryError| {
            ApiError::BadRequest(e.to_string())
        })?,
    };
    Ok(Json(state.telemetry.snapshot(range).await))
}

async fn alert_history_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({ "alerts": state.telemetry.alert_history() }))
}

#[derive(Debug, Deserialize)]
struct SampleBatch {
    samples: Vec<Sample>,
}

#[derive(Debug, Deserialize)]
struct Sample {
    metric: String,
    value: f64,
    at: Option<DateTime<Utc>>,
}

async fn record_samples_handler(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<SampleBatch>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    // Validate the whole batch before recording any of it.
    let parsed = batch
        .samples
        .into_iter()
        .map(|s| {
            let key: MetricKey = s.metric.parse().map_err(|e: TelemetryError| {
                ApiError::BadRequest(e.to_string())
            })?;
            if !s.value.is_finite() {
                return Err(ApiError::BadRequest(format!("{}: value must be finite", s.metric)));
            }
            Ok((key, s.value, s.at.unwrap_or_else(Utc::now)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    for (key, value, at) in &parsed {
        state.samples.record_at(*key, *value, *at);
    }
    Ok((StatusCode::ACCEPTED, Json(json!({ "recorded": parsed.len() }))))
}

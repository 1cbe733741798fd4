// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Evidence Telemetry Domain
//!
//! Windowed health metrics, their threshold classification and the
//! severity-tagged alerts raised when a metric leaves the healthy band.
//!
//! Classification ([`classify`]) and severity ([`severity_for`]) are pure
//! functions of `(metric, value)`; they never look at alert state.
//!
//! ## Thresholds
//!
//! | Metric | Unit | warn | bad |
//! |--------|------|------|-----|
//! | p95 latency | ms | > 800 | > 2000 |
//! | error rate | % | >= 1 | >= 5 |
//! | workflow success | % | < 95 | < 85 |
//! | stuck workflows | count | > 0 | > 3 |
//! | parse success | % | < 98 | < 90 |
//! | queue depth | count | > 100 | > 500 |
//! | p95 time-to-searchable | s | > 30 | > 120 |
//! | retrieval hit-rate | % | < 90 | < 75 |
//! | provenance coverage | % | < 99 | < 95 |
//! | cross-tenant violations | count | never | > 0 |

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::domain::golden::{RunId, RunStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RangeLabel {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "24h")]
    H24,
    #[serde(rename = "7d")]
    D7,
}

impl RangeLabel {
    pub const ALL: [RangeLabel; 4] = [RangeLabel::M15, RangeLabel::H1, RangeLabel::H24, RangeLabel::D7];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::M15 => "15m",
            Self::H1 => "1h",
            Self::H24 => "24h",
            Self::D7 => "7d",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Self::M15 => Duration::minutes(15),
            Self::H1 => Duration::hours(1),
            Self::H24 => Duration::hours(24),
            Self::D7 => Duration::days(7),
        }
    }

    /// Shortest refresh interval that still carries new information for
    /// this window. Cached snapshots are never older than this.
    pub fn min_refresh(&self) -> std::time::Duration {
        std::time::Duration::from_secs(match self {
            Self::M15 => 15,
            Self::H1 => 30,
            Self::H24 => 60,
            Self::D7 => 300,
        })
    }
}

impl Default for RangeLabel {
    fn default() -> Self {
        Self::M15
    }
}

impl std::fmt::Display for RangeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeLabel {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "15m" => Ok(Self::M15),
            "1h" => Ok(Self::H1),
            "24h" => Ok(Self::H24),
            "7d" => Ok(Self::D7),
            other => Err(TelemetryError::UnknownRange(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricGroup {
    Reliability,
    Ingestion,
    MemoryQuality,
}

/// How raw samples within a window collapse into one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    P95,
    Mean,
    Sum,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    LatencyP95Ms,
    ErrorRate,
    WorkflowSuccessRate,
    StuckWorkflows,
    ParseSuccessRate,
    QueueDepth,
    TimeToSearchableP95Secs,
    RetrievalHitRate,
    ProvenanceCoverage,
    CrossTenantViolations,
}

impl MetricKey {
    pub const ALL: [MetricKey; 10] = [
        MetricKey::LatencyP95Ms,
        MetricKey::ErrorRate,
        MetricKey::WorkflowSuccessRate,
        MetricKey::StuckWorkflows,
        MetricKey::ParseSuccessRate,
        MetricKey::QueueDepth,
        MetricKey::TimeToSearchableP95Secs,
        MetricKey::RetrievalHitRate,
        MetricKey::ProvenanceCoverage,
        MetricKey::CrossTenantViolations,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LatencyP95Ms => "latency_p95_ms",
            Self::ErrorRate => "error_rate",
            Self::WorkflowSuccessRate => "workflow_success_rate",
            Self::StuckWorkflows => "stuck_workflows",
            Self::ParseSuccessRate => "parse_success_rate",
            Self::QueueDepth => "queue_depth",
            Self::TimeToSearchableP95Secs => "time_to_searchable_p95_secs",
            Self::RetrievalHitRate => "retrieval_hit_rate",
            Self::ProvenanceCoverage => "provenance_coverage",
            Self::CrossTenantViolations => "cross_tenant_violations",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::LatencyP95Ms => "p95 latency",
            Self::ErrorRate => "Error rate",
            Self::WorkflowSuccessRate => "Workflow success",
            Self::StuckWorkflows => "Stuck workflows",
            Self::ParseSuccessRate => "Parse success",
            Self::QueueDepth => "Queue depth",
            Self::TimeToSearchableP95Secs => "p95 time-to-searchable",
            Self::RetrievalHitRate => "Retrieval hit-rate",
            Self::ProvenanceCoverage => "Provenance coverage",
            Self::CrossTenantViolations => "Cross-tenant violations",
        }
    }

    pub fn group(&self) -> MetricGroup {
        match self {
            Self::LatencyP95Ms | Self::ErrorRate | Self::WorkflowSuccessRate | Self::StuckWorkflows => {
                MetricGroup::Reliability
            }
            Self::ParseSuccessRate | Self::QueueDepth | Self::TimeToSearchableP95Secs => MetricGroup::Ingestion,
            Self::RetrievalHitRate | Self::ProvenanceCoverage | Self::CrossTenantViolations => {
                MetricGroup::MemoryQuality
            }
        }
    }

    pub fn aggregation(&self) -> Aggregation {
        match self {
            Self::LatencyP95Ms | Self::TimeToSearchableP95Secs => Aggregation::P95,
            Self::ErrorRate
            | Self::WorkflowSuccessRate
            | Self::ParseSuccessRate
            | Self::RetrievalHitRate
            | Self::ProvenanceCoverage => Aggregation::Mean,
            Self::CrossTenantViolations => Aggregation::Sum,
            Self::StuckWorkflows | Self::QueueDepth => Aggregation::Last,
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Self::LatencyP95Ms => "ms",
            Self::TimeToSearchableP95Secs => "s",
            Self::StuckWorkflows | Self::QueueDepth | Self::CrossTenantViolations => "",
            _ => "%",
        }
    }

    /// A breach here means the system is unsafe, not merely degraded.
    pub fn is_safety_critical(&self) -> bool {
        matches!(self, Self::CrossTenantViolations)
    }
}

impl std::fmt::Display for MetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKey {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| TelemetryError::UnknownMetric(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricStatus {
    Ok,
    Warn,
    Bad,
}

impl MetricStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Classify a metric value against its fixed thresholds.
pub fn classify(key: MetricKey, value: f64) -> MetricStatus {
    use MetricStatus::*;
    if value.is_nan() {
        return Bad;
    }
    let above = |warn: f64, bad: f64| {
        if value > bad {
            Bad
        } else if value > warn {
            Warn
        } else {
            Ok
        }
    };
    let below = |warn: f64, bad: f64| {
        if value < bad {
            Bad
        } else if value < warn {
            Warn
        } else {
            Ok
        }
    };
    match key {
        MetricKey::LatencyP95Ms => above(800.0, 2000.0),
        MetricKey::ErrorRate => {
            if value >= 5.0 {
                Bad
            } else if value >= 1.0 {
                Warn
            } else {
                Ok
            }
        }
        MetricKey::WorkflowSuccessRate => below(95.0, 85.0),
        MetricKey::StuckWorkflows => above(0.0, 3.0),
        MetricKey::ParseSuccessRate => below(98.0, 90.0),
        MetricKey::QueueDepth => above(100.0, 500.0),
        MetricKey::TimeToSearchableP95Secs => above(30.0, 120.0),
        MetricKey::RetrievalHitRate => below(90.0, 75.0),
        MetricKey::ProvenanceCoverage => below(99.0, 95.0),
        MetricKey::CrossTenantViolations => {
            if value > 0.0 {
                Bad
            } else {
                Ok
            }
        }
    }
}

/// Alert severity, `P0` most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    P0,
    P1,
    P2,
    P3,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
            Self::P3 => "P3",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a breach, from the metric and how far it is out of band.
/// Returns `None` for a healthy value.
pub fn severity_for(key: MetricKey, value: f64) -> Option<AlertSeverity> {
    use AlertSeverity::*;
    let status = classify(key, value);
    if status.is_healthy() {
        return None;
    }
    let bad = status == MetricStatus::Bad;
    Some(match key {
        MetricKey::CrossTenantViolations => P0,
        MetricKey::WorkflowSuccessRate if value < 50.0 => P0,
        MetricKey::WorkflowSuccessRate | MetricKey::ErrorRate | MetricKey::ProvenanceCoverage => {
            if bad {
                P1
            } else {
                P2
            }
        }
        MetricKey::LatencyP95Ms
        | MetricKey::StuckWorkflows
        | MetricKey::ParseSuccessRate
        | MetricKey::QueueDepth
        | MetricKey::TimeToSearchableP95Secs
        | MetricKey::RetrievalHitRate => {
            if bad {
                P2
            } else {
                P3
            }
        }
    })
}

/// One metric as shown for a window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricCard {
    pub key: MetricKey,
    pub label: String,
    pub value: Option<f64>,
    pub unit: String,
    pub status: MetricStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl MetricCard {
    /// Build a card; a missing value degrades to `bad` with a note.
    pub fn new(key: MetricKey, value: Option<f64>, range: RangeLabel) -> Self {
        match value.filter(|v| !v.is_nan()) {
            Some(v) => Self {
                key,
                label: key.label().to_string(),
                value: Some(v),
                unit: key.unit().to_string(),
                status: classify(key, v),
                note: None,
            },
            None => Self::unavailable(key, range, "no data"),
        }
    }

    pub fn unavailable(key: MetricKey, range: RangeLabel, reason: &str) -> Self {
        Self {
            key,
            label: key.label().to_string(),
            value: None,
            unit: key.unit().to_string(),
            status: MetricStatus::Bad,
            note: Some(format!("metric source unavailable for {}: {}", range, reason)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Open,
    Closed,
}

/// Severity-tagged record of a threshold breach. Never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertItem {
    pub id: String,
    /// Underlying cause; at most one open alert per cause.
    pub cause: MetricKey,
    pub severity: AlertSeverity,
    pub title: String,
    pub detail: String,
    pub raised_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub status: AlertStatus,
    /// Start of the current uninterrupted healthy stretch, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub healthy_since: Option<DateTime<Utc>>,
}

impl AlertItem {
    pub fn raise(cause: MetricKey, severity: AlertSeverity, value: f64, range: RangeLabel, at: DateTime<Utc>) -> Self {
        let mut alert = Self {
            id: format!("alert-{}", uuid::Uuid::new_v4()),
            cause,
            severity,
            title: String::new(),
            detail: String::new(),
            raised_at: at,
            closed_at: None,
            status: AlertStatus::Open,
            healthy_since: None,
        };
        alert.describe(severity, value, range);
        alert
    }

    /// Raise the severity of an open alert in place. Returns false, leaving
    /// the alert as it was, unless `severity` is more urgent.
    pub fn escalate(&mut self, severity: AlertSeverity, value: f64, range: RangeLabel) -> bool {
        if severity >= self.severity {
            return false;
        }
        self.describe(severity, value, range);
        true
    }

    fn describe(&mut self, severity: AlertSeverity, value: f64, range: RangeLabel) {
        self.severity = severity;
        self.title = format!("{} {} out of threshold", severity, self.cause.label());
        self.detail = format!(
            "{} is {}{} over the {} window ({})",
            self.cause.label(),
            format_value(value),
            self.cause.unit(),
            range,
            classify(self.cause, value).as_label()
        );
    }

    pub fn is_open(&self) -> bool {
        self.status == AlertStatus::Open
    }
}

impl MetricStatus {
    fn as_label(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Warn => "warn",
            Self::Bad => "bad",
        }
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    AlertRaised,
    AlertEscalated,
    AlertClosed,
    GoldenRun,
    WorkflowTransition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub at: DateTime<Utc>,
    pub kind: ChangeKind,
    pub summary: String,
}

/// Pointer to the most recent golden run, for operators to consult.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestRunRef {
    pub run_id: RunId,
    pub dataset_id: String,
    pub status: RunStatus,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceSnapshot {
    pub range: RangeLabel,
    pub generated_at: DateTime<Utc>,
    pub reliability: Vec<MetricCard>,
    pub ingestion: Vec<MetricCard>,
    pub memory_quality: Vec<MetricCard>,
    pub open_alerts: Vec<AlertItem>,
    pub operator_narrative: String,
    pub stakeholder_narrative: String,
    pub change_log: Vec<ChangeLogEntry>,
    pub latest_run: Option<LatestRunRef>,
}

impl EvidenceSnapshot {
    pub fn cards(&self) -> impl Iterator<Item = &MetricCard> {
        self.reliability.iter().chain(&self.ingestion).chain(&self.memory_quality)
    }

    pub fn card(&self, key: MetricKey) -> Option<&MetricCard> {
        self.cards().find(|c| c.key == key)
    }
}

/// Source of windowed metric values.
#[async_trait]
pub trait MetricsFeed: Send + Sync {
    /// Aggregated value of `key` over `range`, ending now.
    async fn read(&self, key: MetricKey, range: RangeLabel) -> Result<f64, FeedError>;
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("No samples for {0} in window")]
    NoData(MetricKey),

    #[error("Metric source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Unknown range label: {0} (expected 15m, 1h, 24h or 7d)")]
    UnknownRange(String),

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Evidence Recorder - Event Bus -> Metrics Feed
//
// Passive observer of the domain event stream. Converts workflow, golden
// run and alert events into metric samples and recent change-log entries.
// Metrics with no in-process source (queue depth, time-to-searchable,
// provenance coverage, cross-tenant violations) arrive via
// `POST /metrics/samples` instead.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::events::{AlertEvent, ValidationEvent, WorkflowEvent};
use crate::domain::golden::{CheckId, CheckStatus};
use crate::domain::telemetry::{ChangeKind, ChangeLogEntry, MetricKey};
use crate::domain::workflow::WorkflowStatus;
use crate::infrastructure::event_bus::{DomainEvent, EventBus, EventBusError};
use crate::infrastructure::metrics_feed::InMemoryMetricsFeed;

/// Bounded, newest-last log of notable changes.
pub struct ChangeLog {
    entries: Mutex<VecDeque<ChangeLogEntry>>,
    capacity: usize,
}

impl ChangeLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, kind: ChangeKind, summary: impl Into<String>) {
        let mut entries = self.entries.lock();
        entries.push_back(ChangeLogEntry {
            at: Utc::now(),
            kind,
            summary: summary.into(),
        });
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ChangeLogEntry> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }
}

pub struct EvidenceRecorder {
    feed: Arc<InMemoryMetricsFeed>,
    change_log: Arc<ChangeLog>,
}

impl EvidenceRecorder {
    pub fn new(feed: Arc<InMemoryMetricsFeed>, change_log: Arc<ChangeLog>) -> Self {
        Self { feed, change_log }
    }

    /// Consume the bus until it closes.
    pub fn spawn(self, event_bus: &EventBus) -> JoinHandle<()> {
        let mut receiver = event_bus.subscribe();
        tokio::spawn(async move {
            info!("Evidence recorder listening on the event bus");
            loop {
                match receiver.recv().await {
                    Ok(event) => self.handle(&event),
                    Err(EventBusError::Lagged(n)) => {
                        warn!("Evidence recorder dropped {} events", n);
                    }
                    Err(EventBusError::Closed) | Err(EventBusError::Empty) => break,
                }
            }
            debug!("Evidence recorder stopped");
        })
    }

    pub fn handle(&self, event: &DomainEvent) {
        match event {
            DomainEvent::Workflow(e) => self.on_workflow(e),
            DomainEvent::Validation(e) => self.on_validation(e),
            DomainEvent::Alert(e) => self.on_alert(e),
        }
    }

    fn on_workflow(&self, event: &WorkflowEvent) {
        match event {
            WorkflowEvent::WorkflowTransitioned {
                workflow_id,
                from,
                to,
                cause,
                ..
            } => {
                match to {
                    WorkflowStatus::Completed => self.feed.record(MetricKey::WorkflowSuccessRate, 100.0),
                    WorkflowStatus::Failed => self.feed.record(MetricKey::WorkflowSuccessRate, 0.0),
                    _ => {}
                }
                if to.is_terminal() {
                    self.change_log.push(
                        ChangeKind::WorkflowTransition,
                        format!("{} {} -> {} ({})", workflow_id, from, to, cause),
                    );
                }
            }
            WorkflowEvent::SignalDelivered { .. } => self.feed.record(MetricKey::ErrorRate, 0.0),
            WorkflowEvent::SignalRejected { .. } => self.feed.record(MetricKey::ErrorRate, 100.0),
            WorkflowEvent::WorkflowStarted { .. } => {}
        }
    }

    fn on_validation(&self, event: &ValidationEvent) {
        match event {
            ValidationEvent::CheckCompleted {
                check, status, duration_ms, ..
            } => {
                let ok = if *status == CheckStatus::Fail { 0.0 } else { 100.0 };
                match check {
                    CheckId::IngestDocument => self.feed.record(MetricKey::ParseSuccessRate, ok),
                    CheckId::MemorySearch => {
                        let hit = if *status == CheckStatus::Pass { 100.0 } else { 0.0 };
                        self.feed.record(MetricKey::RetrievalHitRate, hit);
                    }
                    CheckId::GroundedAnswer => self.feed.record(MetricKey::LatencyP95Ms, *duration_ms as f64),
                    _ => {}
                }
                self.feed.record(MetricKey::ErrorRate, 100.0 - ok);
            }
            ValidationEvent::RunCompleted {
                run_id,
                dataset_id,
                status,
                checks_passed,
                checks_total,
                ..
            } => {
                self.change_log.push(
                    ChangeKind::GoldenRun,
                    format!(
                        "golden run {} on {}: {} ({}/{})",
                        run_id, dataset_id, status, checks_passed, checks_total
                    ),
                );
            }
            ValidationEvent::RunStarted { .. } => {}
        }
    }

    fn on_alert(&self, event: &AlertEvent) {
        match event {
            AlertEvent::AlertRaised { severity, title, .. } => {
                self.change_log
                    .push(ChangeKind::AlertRaised, format!("{} raised: {}", severity, title));
            }
            AlertEvent::AlertEscalated { from, to, title, .. } => {
                self.change_log
                    .push(ChangeKind::AlertEscalated, format!("{} escalated from {}: {}", to, from, title));
            }
            AlertEvent::AlertClosed { alert_id, cause, .. } => {
                self.change_log
                    .push(ChangeKind::AlertClosed, format!("{} closed ({})", alert_id, cause.label()));
            }
        }
    }
}

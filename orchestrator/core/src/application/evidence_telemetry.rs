// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Evidence Telemetry Aggregator
//!
//! Read-only aggregation of windowed health metrics into an
//! [`EvidenceSnapshot`]. Snapshots are cached per range for
//! `min(snapshot_cache_secs, range.min_refresh())`.
//!
//! Alert evaluation always runs against the 15m window so that viewers of
//! different ranges agree on what is currently breaching. The ledger is the
//! single writer for alert state.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::application::alert_ledger::{AlertLedger, LedgerChange};
use crate::application::workflow_tracker::WorkflowTracker;
use crate::domain::events::AlertEvent;
use crate::domain::narrative::{telemetry_narratives, Narrative};
use crate::domain::node_config::TelemetryConfig;
use crate::domain::repository::GoldenRunRepository;
use crate::domain::telemetry::{
    AlertItem, EvidenceSnapshot, FeedError, LatestRunRef, MetricCard, MetricGroup, MetricKey, MetricsFeed, RangeLabel,
};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::evidence_recorder::ChangeLog;

/// Window the alert ledger evaluates against.
const ALERT_WINDOW: RangeLabel = RangeLabel::M15;

struct CachedSnapshot {
    built_at: Instant,
    snapshot: EvidenceSnapshot,
}

pub struct EvidenceTelemetryService {
    feed: Arc<dyn MetricsFeed>,
    ledger: Arc<AlertLedger>,
    runs: Arc<dyn GoldenRunRepository>,
    change_log: Arc<ChangeLog>,
    event_bus: Arc<EventBus>,
    tracker: Option<Arc<WorkflowTracker>>,
    config: TelemetryConfig,
    cache: DashMap<RangeLabel, CachedSnapshot>,
}

impl EvidenceTelemetryService {
    pub fn new(
        feed: Arc<dyn MetricsFeed>,
        ledger: Arc<AlertLedger>,
        runs: Arc<dyn GoldenRunRepository>,
        change_log: Arc<ChangeLog>,
        event_bus: Arc<EventBus>,
        config: TelemetryConfig,
    ) -> Self {
        Self {
            feed,
            ledger,
            runs,
            change_log,
            event_bus,
            tracker: None,
            config,
            cache: DashMap::new(),
        }
    }

    /// Count stuck workflows live from the tracker instead of the feed.
    pub fn with_tracker(mut self, tracker: Arc<WorkflowTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    fn cache_ttl(&self, range: RangeLabel) -> Duration {
        Duration::from_secs(self.config.snapshot_cache_secs).min(range.min_refresh())
    }

    /// Build (or reuse) the snapshot for one range. Never fails as a whole:
    /// an unreadable metric becomes a `bad` card with a note.
    pub async fn snapshot(&self, range: RangeLabel) -> EvidenceSnapshot {
        let ttl = self.cache_ttl(range);
        if let Some(cached) = self.cache.get(&range).filter(|c| c.built_at.elapsed() < ttl) {
            debug!(range = %range, "Serving cached evidence snapshot");
            return cached.snapshot.clone();
        }

        let readings = self.read_all(range).await;
        if range == ALERT_WINDOW {
            self.apply_alerts(&readings);
        } else {
            let alert_readings = self.read_all(ALERT_WINDOW).await;
            self.apply_alerts(&alert_readings);
        }

        let cards: Vec<MetricCard> = readings
            .iter()
            .map(|(key, reading)| match reading {
                Ok(value) => MetricCard::new(*key, Some(*value), range),
                Err(reason) => MetricCard::unavailable(*key, range, reason),
            })
            .collect();
        let open_alerts = self.ledger.open_alerts();
        let Narrative { operator, stakeholder } = telemetry_narratives(&cards, &open_alerts);

        let latest_run = match self.runs.latest().await {
            Ok(run) => run.map(|run| LatestRunRef {
                run_id: run.id,
                dataset_id: run.dataset_id,
                status: run.status,
                finished_at: run.finished_at,
            }),
            Err(e) => {
                warn!("Latest golden run unavailable for snapshot: {}", e);
                None
            }
        };

        let in_group = |group: MetricGroup| -> Vec<MetricCard> {
            cards.iter().filter(|c| c.key.group() == group).cloned().collect()
        };
        let snapshot = EvidenceSnapshot {
            range,
            generated_at: Utc::now(),
            reliability: in_group(MetricGroup::Reliability),
            ingestion: in_group(MetricGroup::Ingestion),
            memory_quality: in_group(MetricGroup::MemoryQuality),
            open_alerts,
            operator_narrative: operator,
            stakeholder_narrative: stakeholder,
            change_log: self.change_log.recent(self.config.change_log_len),
            latest_run,
        };

        self.cache.insert(
            range,
            CachedSnapshot {
                built_at: Instant::now(),
                snapshot: snapshot.clone(),
            },
        );
        snapshot
    }

    /// Evaluate alerts without building a snapshot.
    pub async fn evaluate_alerts(&self) {
        let readings = self.read_all(ALERT_WINDOW).await;
        self.apply_alerts(&readings);
    }

    pub fn open_alerts(&self) -> Vec<AlertItem> {
        self.ledger.open_alerts()
    }

    /// Every alert the ledger has raised, closed ones included, newest first.
    pub fn alert_history(&self) -> Vec<AlertItem> {
        let mut alerts = self.ledger.all();
        alerts.sort_by(|a, b| b.raised_at.cmp(&a.raised_at));
        alerts
    }

    /// Periodic alert evaluation so breaches are raised with no viewers.
    pub fn spawn_evaluator(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                self.evaluate_alerts().await;
            }
        })
    }

    async fn read_all(&self, range: RangeLabel) -> Vec<(MetricKey, Result<f64, String>)> {
        let mut readings = Vec::with_capacity(MetricKey::ALL.len());
        for key in MetricKey::ALL {
            let reading = match (key, &self.tracker) {
                (MetricKey::StuckWorkflows, Some(tracker)) => tracker
                    .stuck_count()
                    .await
                    .map(|n| n as f64)
                    .map_err(|e| e.to_string()),
                _ => self.feed.read(key, range).await.map_err(|e| match e {
                    FeedError::NoData(_) => "no data".to_string(),
                    FeedError::Unavailable(reason) => reason,
                }),
            };
            readings.push((key, reading));
        }
        readings
    }

    fn apply_alerts(&self, readings: &[(MetricKey, Result<f64, String>)]) {
        let now = Utc::now();
        for (key, reading) in readings {
            let Ok(value) = reading else {
                continue;
            };
            match self.ledger.evaluate(*key, *value, ALERT_WINDOW, now) {
                Some(LedgerChange::Raised(alert)) => {
                    self.event_bus.publish_alert_event(AlertEvent::AlertRaised {
                        alert_id: alert.id,
                        cause: alert.cause,
                        severity: alert.severity,
                        title: alert.title,
                        raised_at: alert.raised_at,
                    });
                }
                Some(LedgerChange::Escalated { alert, from }) => {
                    self.event_bus.publish_alert_event(AlertEvent::AlertEscalated {
                        alert_id: alert.id,
                        cause: alert.cause,
                        from,
                        to: alert.severity,
                        title: alert.title,
                        escalated_at: now,
                    });
                }
                Some(LedgerChange::Closed(alert)) => {
                    self.event_bus.publish_alert_event(AlertEvent::AlertClosed {
                        alert_id: alert.id,
                        cause: alert.cause,
                        closed_at: alert.closed_at.unwrap_or(now),
                    });
                }
                None => {}
            }
        }
    }
}

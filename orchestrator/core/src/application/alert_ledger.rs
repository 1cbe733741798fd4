// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Alert Ledger
//!
//! Single writer for alert raise/close decisions. Every evaluation takes the
//! ledger lock, so two concurrent snapshots observing the same breach can
//! never raise it twice.
//!
//! Lifecycle per cause:
//! - healthy -> warn/bad: raise one open alert with severity from the value
//! - still breaching: the open alert stays, its healthy stretch resets, and
//!   it escalates in place when the value now maps to a more urgent severity
//! - healthy again: close only once the metric has stayed healthy for one
//!   full window

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::domain::telemetry::{classify, severity_for, AlertItem, AlertSeverity, AlertStatus, MetricKey, RangeLabel};

#[derive(Debug, Clone)]
pub enum LedgerChange {
    Raised(AlertItem),
    Escalated { alert: AlertItem, from: AlertSeverity },
    Closed(AlertItem),
}

#[derive(Default)]
pub struct AlertLedger {
    alerts: Mutex<Vec<AlertItem>>,
}

impl AlertLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one observation of `key` over `window` into the ledger.
    pub fn evaluate(&self, key: MetricKey, value: f64, window: RangeLabel, now: DateTime<Utc>) -> Option<LedgerChange> {
        let status = classify(key, value);
        let mut alerts = self.alerts.lock();
        let open = alerts.iter().position(|a| a.cause == key && a.is_open());

        match (open, status.is_healthy()) {
            (Some(idx), false) => {
                let alert = &mut alerts[idx];
                alert.healthy_since = None;
                let from = alert.severity;
                let severity = severity_for(key, value)?;
                if !alert.escalate(severity, value, window) {
                    return None;
                }
                warn!(alert_id = %alert.id, cause = key.as_str(), from = from.as_str(), to = severity.as_str(), value, "Alert escalated");
                metrics::counter!("goldthread_alerts_escalated_total", "severity" => severity.as_str()).increment(1);
                Some(LedgerChange::Escalated {
                    alert: alert.clone(),
                    from,
                })
            }
            (None, false) => {
                let severity = severity_for(key, value)?;
                let alert = AlertItem::raise(key, severity, value, window, now);
                warn!(alert_id = %alert.id, cause = key.as_str(), severity = severity.as_str(), value, "Alert raised");
                metrics::counter!("goldthread_alerts_raised_total", "severity" => severity.as_str()).increment(1);
                alerts.push(alert.clone());
                Some(LedgerChange::Raised(alert))
            }
            (Some(idx), true) => {
                let alert = &mut alerts[idx];
                let since = *alert.healthy_since.get_or_insert(now);
                if now - since < window.duration() {
                    return None;
                }
                alert.status = AlertStatus::Closed;
                alert.closed_at = Some(now);
                info!(alert_id = %alert.id, cause = key.as_str(), "Alert closed after a healthy window");
                Some(LedgerChange::Closed(alert.clone()))
            }
            (None, true) => None,
        }
    }

    /// Open alerts, most severe first, then oldest first.
    pub fn open_alerts(&self) -> Vec<AlertItem> {
        let mut open: Vec<AlertItem> = self.alerts.lock().iter().filter(|a| a.is_open()).cloned().collect();
        open.sort_by(|a, b| a.severity.cmp(&b.severity).then(a.raised_at.cmp(&b.raised_at)));
        open
    }

    /// Every alert ever raised, closed ones included.
    pub fn all(&self) -> Vec<AlertItem> {
        self.alerts.lock().clone()
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory Metrics Feed
//!
//! Bounded, timestamped sample store per metric. `read` collapses the
//! samples inside a window using the metric's aggregation (p95, mean, sum
//! or last). Samples are pushed by the evidence recorder and by external
//! collectors through `POST /metrics/samples`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

use crate::domain::telemetry::{Aggregation, FeedError, MetricKey, MetricsFeed, RangeLabel};

pub struct InMemoryMetricsFeed {
    samples: RwLock<HashMap<MetricKey, VecDeque<(DateTime<Utc>, f64)>>>,
    capacity: usize,
}

impl InMemoryMetricsFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, key: MetricKey, value: f64) {
        self.record_at(key, value, Utc::now());
    }

    pub fn record_at(&self, key: MetricKey, value: f64, at: DateTime<Utc>) {
        let mut samples = self.samples.write();
        let series = samples.entry(key).or_default();
        series.push_back((at, value));
        while series.len() > self.capacity {
            series.pop_front();
        }
    }

    /// Values of `key` inside `(since, until]`, oldest first.
    fn window(&self, key: MetricKey, since: DateTime<Utc>, until: DateTime<Utc>) -> Vec<f64> {
        self.samples
            .read()
            .get(&key)
            .map(|series| {
                series
                    .iter()
                    .filter(|(at, _)| *at > since && *at <= until)
                    .map(|(_, v)| *v)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Nearest-rank percentile over an unsorted slice.
pub fn percentile(values: &[f64], pct: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted.get(rank.saturating_sub(1).min(sorted.len() - 1)).copied()
}

fn aggregate(aggregation: Aggregation, values: &[f64]) -> Option<f64> {
    match aggregation {
        Aggregation::P95 => percentile(values, 95.0),
        Aggregation::Mean if values.is_empty() => None,
        Aggregation::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
        Aggregation::Sum if values.is_empty() => None,
        Aggregation::Sum => Some(values.iter().sum()),
        Aggregation::Last => values.last().copied(),
    }
}

#[async_trait]
impl MetricsFeed for InMemoryMetricsFeed {
    async fn read(&self, key: MetricKey, range: RangeLabel) -> Result<f64, FeedError> {
        let now = Utc::now();
        let values = self.window(key, now - range.duration(), now);
        aggregate(key.aggregation(), &values).ok_or(FeedError::NoData(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_percentile_nearest_rank() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&values, 95.0), Some(95.0));
        assert_eq!(percentile(&[42.0], 95.0), Some(42.0));
        assert_eq!(percentile(&[], 95.0), None);
    }

    #[tokio::test]
    async fn test_read_respects_window_and_aggregation() {
        let feed = InMemoryMetricsFeed::new(100);
        let now = Utc::now();
        feed.record_at(MetricKey::ParseSuccessRate, 50.0, now - Duration::hours(2));
        feed.record_at(MetricKey::ParseSuccessRate, 97.0, now - Duration::minutes(5));
        feed.record_at(MetricKey::ParseSuccessRate, 99.0, now - Duration::minutes(1));

        let m15 = feed.read(MetricKey::ParseSuccessRate, RangeLabel::M15).await.unwrap();
        assert!((m15 - 98.0).abs() < 1e-9);
        let h24 = feed.read(MetricKey::ParseSuccessRate, RangeLabel::H24).await.unwrap();
        assert!((h24 - 82.0).abs() < 1e-9);

        feed.record(MetricKey::QueueDepth, 7.0);
        feed.record(MetricKey::QueueDepth, 3.0);
        assert_eq!(feed.read(MetricKey::QueueDepth, RangeLabel::M15).await.unwrap(), 3.0);
    }

    #[tokio::test]
    async fn test_missing_series_is_no_data() {
        let feed = InMemoryMetricsFeed::new(10);
        let err = feed.read(MetricKey::RetrievalHitRate, RangeLabel::H1).await.unwrap_err();
        assert!(matches!(err, FeedError::NoData(MetricKey::RetrievalHitRate)));
    }

    #[test]
    fn test_capacity_bounds_series() {
        let feed = InMemoryMetricsFeed::new(2);
        for v in [1.0, 2.0, 3.0] {
            feed.record(MetricKey::QueueDepth, v);
        }
        let now = Utc::now();
        assert_eq!(feed.window(MetricKey::QueueDepth, now - Duration::hours(1), now + Duration::seconds(1)), vec![2.0, 3.0]);
    }
}

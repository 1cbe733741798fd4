// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Seeded Golden Datasets
//!
//! Immutable fixtures the golden thread runs against. Two fixtures are
//! compiled in; more can be loaded from `spec.validation.dataset_dir`,
//! where each `<id>.md` / `<id>.txt` file may declare its anchors in a
//! leading `anchors: a, b, c` line.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use crate::domain::golden::GoldenDataset;

const SAMPLE_POLICY: &str = "\
# Data Retention Policy

Customer records are retained for seven years after account closure.
All retained records are encrypted at rest with AES-256 and keys rotate every 90 days.
Deletion requests are honoured within 30 days unless a legal hold applies.
Access to retained records requires two-person approval and is logged for audit.
";

const INCIDENT_RUNBOOK: &str = "\
# Incident Escalation Runbook

Severity one incidents page the on-call engineer within five minutes.
The incident commander opens a bridge and posts status updates every 30 minutes.
Customer-facing impact requires a status page entry within 15 minutes.
A blameless postmortem is due within five business days of resolution.
";

/// Read-only catalog of datasets, keyed by id.
#[derive(Debug, Clone)]
pub struct DatasetCatalog {
    datasets: BTreeMap<String, GoldenDataset>,
}

impl DatasetCatalog {
    /// The compiled-in fixtures.
    pub fn seeded() -> Self {
        let mut datasets = BTreeMap::new();
        for dataset in [
            fixture(
                "sample-policy",
                "Sample data retention policy",
                "sample-policy.md",
                SAMPLE_POLICY.as_bytes(),
                &["retention", "encrypted", "deletion"],
            ),
            fixture(
                "incident-runbook",
                "Incident escalation runbook",
                "incident-runbook.md",
                INCIDENT_RUNBOOK.as_bytes(),
                &["on-call", "incident commander", "postmortem"],
            ),
        ] {
            datasets.insert(dataset.id.clone(), dataset);
        }
        Self { datasets }
    }

    /// Seeded fixtures plus any found in `dir`. Unreadable files are skipped.
    pub fn with_directory(dir: &Path) -> Self {
        let mut catalog = Self::seeded();
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Dataset directory {:?} unreadable: {}", dir, e);
                return catalog;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let is_fixture = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| e == "md" || e == "txt");
            if !is_fixture {
                continue;
            }
            let (Some(id), Some(filename)) = (
                path.file_stem().and_then(|s| s.to_str()).map(str::to_string),
                path.file_name().and_then(|s| s.to_str()).map(str::to_string),
            ) else {
                continue;
            };
            if catalog.datasets.contains_key(&id) {
                warn!(dataset_id = %id, "Dataset id collides with a seeded fixture, skipping");
                continue;
            }
            match std::fs::read(&path) {
                Ok(bytes) => {
                    let anchors = declared_anchors(&bytes);
                    let anchor_refs: Vec<&str> = anchors.iter().map(String::as_str).collect();
                    let dataset = fixture(&id, &id, &filename, &bytes, &anchor_refs);
                    info!(dataset_id = %id, hash = %dataset.content_hash, "Loaded dataset fixture");
                    catalog.datasets.insert(id, dataset);
                }
                Err(e) => warn!("Failed to read dataset {:?}: {}", path, e),
            }
        }
        catalog
    }

    pub fn list(&self) -> Vec<GoldenDataset> {
        self.datasets.values().cloned().collect()
    }

    pub fn get(&self, id: &str) -> Option<&GoldenDataset> {
        self.datasets.get(id)
    }
}

fn fixture(id: &str, name: &str, filename: &str, bytes: &[u8], anchors: &[&str]) -> GoldenDataset {
    GoldenDataset {
        id: id.to_string(),
        name: name.to_string(),
        filename: filename.to_string(),
        content_hash: hex::encode(Sha256::digest(bytes)),
        size_label: size_label(bytes.len()),
        anchor_terms: anchors.iter().map(|a| a.to_string()).collect(),
        expected_sources: vec![filename.to_string()],
        content: bytes.to_vec(),
    }
}

fn declared_anchors(bytes: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(bytes);
    text.lines()
        .next()
        .and_then(|line| line.strip_prefix("anchors:"))
        .map(|list| {
            list.split(',')
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn size_label(len: usize) -> String {
    const KB: f64 = 1024.0;
    let len = len as f64;
    if len < KB {
        format!("{} B", len)
    } else if len < KB * KB {
        format!("{:.1} KB", len / KB)
    } else {
        format!("{:.1} MB", len / (KB * KB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_catalog_contains_sample_policy() {
        let catalog = DatasetCatalog::seeded();
        let dataset = catalog.get("sample-policy").unwrap();
        assert_eq!(dataset.filename, "sample-policy.md");
        assert_eq!(dataset.content_hash.len(), 64);
        assert!(!dataset.anchor_terms.is_empty());
        assert_eq!(dataset.content_hash, hex::encode(Sha256::digest(SAMPLE_POLICY.as_bytes())));
    }

    #[test]
    fn test_directory_fixtures_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("faq.md"), "anchors: refund, shipping\nRefunds ship in 5 days.\n").unwrap();
        std::fs::write(dir.path().join("ignored.bin"), [0u8, 1, 2]).unwrap();

        let catalog = DatasetCatalog::with_directory(dir.path());
        let faq = catalog.get("faq").unwrap();
        assert_eq!(faq.anchor_terms, vec!["refund".to_string(), "shipping".to_string()]);
        assert!(catalog.get("ignored").is_none());
        assert_eq!(catalog.list().len(), 3);
    }

    #[test]
    fn test_size_label() {
        assert_eq!(size_label(512), "512 B");
        assert_eq!(size_label(2048), "2.0 KB");
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Application Layer
//!
//! Use-case services orchestrating the domain against its ports.
//!
//! | Module | Service |
//! |--------|---------|
//! | [`workflow_tracker`] | Workflow State Tracker: list, detail, signal, start, step events |
//! | [`golden_thread`] | Golden Thread Validation Engine: ordered check battery and run log |
//! | [`evidence_telemetry`] | Evidence Telemetry Aggregator: windowed snapshots and narratives |
//! | [`alert_ledger`] | Single-writer alert raise/close state |

pub mod alert_ledger;
pub mod evidence_telemetry;
pub mod golden_thread;
pub mod workflow_tracker;

pub use evidence_telemetry::EvidenceTelemetryService;
pub use golden_thread::GoldenThreadService;
pub use workflow_tracker::{SignalOutcome, StartWorkflowRequest, StepEvent, WorkflowPage, WorkflowTracker};

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Aggregates, value objects and ports for workflow tracking, golden thread
//! validation and evidence telemetry. No I/O lives here.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Business invariants and the contracts infrastructure implements

pub mod capabilities;
pub mod error;
pub mod events;
pub mod golden;
pub mod narrative;
pub mod node_config;
pub mod repository;
pub mod substrate;
pub mod telemetry;
pub mod workflow;

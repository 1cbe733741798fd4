// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Goldthread Core
//!
//! Control-plane core that tracks durable workflows, proves end-to-end
//! correctness through the golden thread check battery, and aggregates
//! evidence telemetry with severity-tagged alerts.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, application services, adapters and HTTP surface

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;

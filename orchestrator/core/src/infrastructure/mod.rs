// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod collaborators;
pub mod datasets;
pub mod db;
pub mod event_bus;
pub mod evidence_recorder;
pub mod metrics_feed;
pub mod repositories;
pub mod substrate_client;

pub use collaborators::http_collaborators;
pub use substrate_client::{HttpSubstrateClient, RetryingSubstrate};

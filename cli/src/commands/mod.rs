// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the goldthread CLI

pub mod config;
pub mod evidence;
pub mod validate;
pub mod workflow;

pub use self::config::ConfigCommand;
pub use self::evidence::EvidenceArgs;
pub use self::validate::ValidateCommand;
pub use self::workflow::WorkflowCommand;

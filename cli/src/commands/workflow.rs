// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Workflow command implementations
//!
//! # Commands
//!
//! - `goldthread workflow list [--status waiting]` - Most recent workflows first
//! - `goldthread workflow show <id>` - Steps, expected signals and context
//! - `goldthread workflow signal <id> <signal>` - Deliver approve / cancel / reject

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::{ColoredString, Colorize};

use goldthread_core::domain::workflow::{StepStatus, WorkflowStatus};

use crate::daemon::DaemonClient;

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// List tracked workflows, most recent first
    List {
        /// Filter by status (running, waiting, completed, failed, cancelled)
        #[arg(long, short = 's')]
        status: Option<WorkflowStatus>,

        #[arg(long, default_value = "20")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// Show a workflow's steps and context
    Show {
        #[arg(value_name = "WORKFLOW_ID")]
        id: String,

        /// Print the raw JSON detail
        #[arg(long)]
        json: bool,
    },

    /// Send a signal to a workflow
    Signal {
        #[arg(value_name = "WORKFLOW_ID")]
        id: String,

        /// Signal name (approve, cancel, reject)
        #[arg(value_name = "SIGNAL")]
        signal: String,

        /// Signal payload (JSON string)
        #[arg(long, short = 'p', value_name = "JSON")]
        payload: Option<String>,
    },
}

pub async fn handle_command(command: WorkflowCommand, client: &DaemonClient) -> Result<()> {
    match command {
        WorkflowCommand::List { status, limit, offset } => list_workflows(client, status, limit, offset).await,
        WorkflowCommand::Show { id, json } => show_workflow(client, &id, json).await,
        WorkflowCommand::Signal { id, signal, payload } => signal_workflow(client, &id, &signal, payload).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn list_workflows(
    client: &DaemonClient,
    status: Option<WorkflowStatus>,
    limit: usize,
    offset: usize,
) -> Result<()> {
    let page = client
        .list_workflows(status.as_ref().map(WorkflowStatus::as_str), limit, offset)
        .await?;

    if page.items.is_empty() {
        println!("{}", "No workflows found".yellow());
        return Ok(());
    }

    println!(
        "{:<38} {:<18} {:<10} {:<16} {}",
        "ID".bold(),
        "TYPE".bold(),
        "STATUS".bold(),
        "STEP".bold(),
        "TASK".bold()
    );
    for wf in &page.items {
        println!(
            "{:<38} {:<18} {:<10} {:<16} {}",
            wf.id.as_str(),
            wf.workflow_type.as_str(),
            paint_status(wf.status),
            wf.current_step.as_deref().unwrap_or("-"),
            wf.task_summary
        );
        if let Some(chain) = &wf.delegation_chain {
            println!("{:<38} {}", "", format!("delegation: {}", chain.join(" → ")).dimmed());
        }
    }
    println!();
    println!(
        "{}",
        format!(
            "Showing {}-{} of {}",
            page.offset + 1,
            page.offset + page.items.len(),
            page.total
        )
        .dimmed()
    );
    Ok(())
}

async fn show_workflow(client: &DaemonClient, id: &str, json: bool) -> Result<()> {
    let detail = client.get_workflow(id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    let summary = &detail.summary;
    println!("{} {}", "Workflow".bold(), summary.id.as_str());
    println!("  Type: {}", summary.workflow_type.as_str());
    println!("  Status: {}", paint_status(summary.status));
    println!("  Actor: {}", summary.originating_actor);
    println!("  Session: {}", summary.session_id);
    println!("  Task: {}", summary.task_summary);
    println!("  Created: {}", summary.created_at.to_rfc3339());
    if let Some(finished) = detail.finished_at {
        println!("  Finished: {}", finished.to_rfc3339());
    }
    if let Some(chain) = &summary.delegation_chain {
        println!("  Delegation: {}", chain.join(" → "));
    }
    if let Some(signal) = &detail.pending_confirmation {
        println!("  {}", format!("'{}' applied, awaiting substrate confirmation", signal).yellow());
    }
    if !detail.expected_signals.is_empty() {
        println!("  Expected signals: {}", detail.expected_signals.join(", "));
    }

    println!();
    println!("{}", "Steps:".bold());
    if detail.steps.is_empty() {
        println!("  {}", "(none reported yet)".dimmed());
    }
    for step in &detail.steps {
        let duration = step
            .duration_ms
            .map(|ms| format!("{}ms", ms))
            .unwrap_or_else(|| "-".to_string());
        let attempt = if step.attempt > 1 {
            format!(" (attempt {})", step.attempt)
        } else {
            String::new()
        };
        println!(
            "  {} {:<16} {:>8}{}",
            step_marker(step.status),
            step.name,
            duration,
            attempt
        );
        if let Some(notes) = &step.notes {
            println!("      {}", notes.dimmed());
        }
    }

    if !detail.context_snapshot.is_empty() {
        println!();
        println!("{}", "Context:".bold());
        for (key, value) in &detail.context_snapshot {
            println!("  {}: {}", key, value);
        }
    }
    Ok(())
}

async fn signal_workflow(client: &DaemonClient, id: &str, signal: &str, payload: Option<String>) -> Result<()> {
    let payload = match payload {
        Some(raw) => serde_json::from_str(&raw).context("Payload must be valid JSON")?,
        None => serde_json::json!({}),
    };

    let outcome = client.signal_workflow(id, signal, payload).await?;
    if outcome.applied {
        println!(
            "{}",
            format!("✓ '{}' delivered to {}: now {}", signal, id, outcome.status).green()
        );
        if outcome.pending_confirmation {
            println!("{}", "  awaiting confirmation from the execution substrate".dimmed());
        }
    } else {
        println!(
            "{}",
            format!("'{}' had no effect: {} is already {}", signal, id, outcome.status).yellow()
        );
    }
    Ok(())
}

fn paint_status(status: WorkflowStatus) -> ColoredString {
    let label = status.as_str();
    match status {
        WorkflowStatus::Running => label.cyan(),
        WorkflowStatus::Waiting => label.yellow(),
        WorkflowStatus::Completed => label.green(),
        WorkflowStatus::Failed => label.red(),
        WorkflowStatus::Cancelled => label.dimmed(),
    }
}

fn step_marker(status: StepStatus) -> ColoredString {
    match status {
        StepStatus::Completed => "✓".green(),
        StepStatus::Failed => "✗".red(),
        StepStatus::Running => "▶".cyan(),
        StepStatus::Waiting => "⏸".yellow(),
        _ => "·".dimmed(),
    }
}

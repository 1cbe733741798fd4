// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Golden thread commands
//!
//! Commands: datasets, run, latest, history, show

use anyhow::Result;
use clap::Subcommand;
use colored::{ColoredString, Colorize};

use goldthread_core::domain::golden::{CheckStatus, GoldenRun, RunMode, RunStatus};

use crate::daemon::DaemonClient;

#[derive(Subcommand)]
pub enum ValidateCommand {
    /// List the seeded datasets
    Datasets,

    /// Execute the golden thread against a dataset
    Run {
        #[arg(value_name = "DATASET_ID", default_value = "sample-policy")]
        dataset: String,

        /// Input provenance (deterministic, acceptance)
        #[arg(long, short = 'm', default_value = "deterministic")]
        mode: RunMode,

        /// Exit non-zero unless the run passes
        #[arg(long)]
        strict: bool,
    },

    /// Show the most recent run
    Latest,

    /// List recent runs, newest first
    History {
        #[arg(long, short = 'n', default_value_t = 10)]
        limit: usize,
    },

    /// Show a run by id
    Show {
        #[arg(value_name = "RUN_ID")]
        run_id: String,

        /// Print the raw JSON run
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: ValidateCommand, client: &DaemonClient) -> Result<()> {
    match command {
        ValidateCommand::Datasets => list_datasets(client).await,
        ValidateCommand::Run { dataset, mode, strict } => {
            println!("Running golden thread on {} ({})...", dataset.bold(), mode.as_str());
            let run = client.run_validation(&dataset, mode.as_str()).await?;
            print_run(&run);
            if strict && run.status != RunStatus::Pass {
                anyhow::bail!("golden run {} finished {}", run.id, run.status);
            }
            Ok(())
        }
        ValidateCommand::Latest => {
            match client.latest_run().await? {
                Some(run) => print_run(&run),
                None => println!("{}", "No golden runs recorded yet".yellow()),
            }
            Ok(())
        }
        ValidateCommand::History { limit } => {
            let runs = client.list_runs(limit).await?;
            if runs.is_empty() {
                println!("{}", "No golden runs recorded yet".yellow());
            }
            for run in runs {
                println!(
                    "{} {}  {}  {}/{}  {}",
                    paint_run(run.status),
                    run.id,
                    run.started_at.format("%Y-%m-%d %H:%M:%S"),
                    run.checks_passed,
                    run.checks_total,
                    run.dataset_id
                );
            }
            Ok(())
        }
        ValidateCommand::Show { run_id, json } => {
            let run = client.get_run(&run_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&run)?);
            } else {
                print_run(&run);
            }
            Ok(())
        }
    }
}

async fn list_datasets(client: &DaemonClient) -> Result<()> {
    let datasets = client.list_datasets().await?;
    for dataset in datasets {
        println!("{} {}", dataset.id.bold(), format!("({})", dataset.size_label).dimmed());
        println!("  {}", dataset.name);
        println!("  file: {}  sha256: {}", dataset.filename, dataset.content_hash);
        println!("  anchors: {}", dataset.anchor_terms.join(", "));
    }
    Ok(())
}

fn print_run(run: &GoldenRun) {
    println!();
    println!(
        "{} {}  {}/{} checks passed",
        paint_run(run.status),
        run.id,
        run.checks_passed,
        run.checks_total
    );
    println!("  Dataset: {}  Mode: {}", run.dataset_id, run.mode.as_str());
    println!("  Trace: {}  Session: {}", run.trace_id, run.session_id);
    if let Some(workflow_id) = &run.workflow_id {
        println!("  Workflow: {}", workflow_id.as_str());
    }
    if let Some(ms) = run.duration_ms {
        println!("  Duration: {}ms", ms);
    }
    println!();

    for (n, check) in run.checks.iter().enumerate() {
        let duration = check.duration_ms.map(|ms| format!("{}ms", ms)).unwrap_or_default();
        println!(
            "  {}. {} {:<22} {:>7}  {}",
            n + 1,
            paint_check(check.status),
            check.name,
            duration,
            check.evidence
        );
    }

    println!();
    println!("{}", "Operator:".bold());
    println!("  {}", run.operator_narrative);
    println!("{}", "Stakeholder:".bold());
    println!("  {}", run.stakeholder_narrative);
}

fn paint_run(status: RunStatus) -> ColoredString {
    match status {
        RunStatus::Pass => status.as_str().green().bold(),
        RunStatus::Warn => status.as_str().yellow().bold(),
        RunStatus::Fail => status.as_str().red().bold(),
        RunStatus::Running => status.as_str().cyan().bold(),
    }
}

fn paint_check(status: CheckStatus) -> ColoredString {
    match status {
        CheckStatus::Pass => "PASS".green(),
        CheckStatus::Warn => "WARN".yellow(),
        CheckStatus::Fail => "FAIL".red(),
        CheckStatus::Pending | CheckStatus::Running => status.as_str().dimmed(),
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Evidence dashboard command

use anyhow::Result;
use clap::Args;
use colored::{ColoredString, Colorize};

use goldthread_core::domain::telemetry::{
    AlertItem, AlertSeverity, EvidenceSnapshot, MetricCard, MetricStatus, RangeLabel,
};

use crate::daemon::DaemonClient;

#[derive(Args)]
pub struct EvidenceArgs {
    /// Time window (15m, 1h, 24h, 7d)
    #[arg(long, short = 'r', default_value = "15m")]
    pub range: RangeLabel,

    /// Print the raw JSON snapshot
    #[arg(long)]
    pub json: bool,

    /// List every alert raised, closed ones included, instead of the snapshot
    #[arg(long)]
    pub alerts: bool,
}

pub async fn handle_command(args: EvidenceArgs, client: &DaemonClient) -> Result<()> {
    if args.alerts {
        let alerts = client.alert_history().await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&alerts)?);
        } else {
            print_alert_history(&alerts);
        }
        return Ok(());
    }
    let snapshot = client.evidence(args.range.as_str()).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print_snapshot(&snapshot);
    }
    Ok(())
}

fn print_snapshot(snapshot: &EvidenceSnapshot) {
    println!(
        "{} {}",
        format!("Evidence ({})", snapshot.range).bold(),
        format!("generated {}", snapshot.generated_at.to_rfc3339()).dimmed()
    );

    print_group("Reliability", &snapshot.reliability);
    print_group("Ingestion", &snapshot.ingestion);
    print_group("Memory quality", &snapshot.memory_quality);

    println!();
    println!("{}", "Open alerts:".bold());
    if snapshot.open_alerts.is_empty() {
        println!("  {}", "none".green());
    }
    for alert in &snapshot.open_alerts {
        println!("  {} {}", paint_severity(alert.severity), alert.title);
        println!("     {}", alert.detail.dimmed());
    }

    println!();
    println!("{}", "Operator:".bold());
    println!("  {}", snapshot.operator_narrative);
    println!("{}", "Stakeholder:".bold());
    println!("  {}", snapshot.stakeholder_narrative);

    if let Some(run) = &snapshot.latest_run {
        println!();
        println!(
            "{} {} on {} ({})",
            "Latest golden run:".bold(),
            run.status,
            run.dataset_id,
            run.run_id
        );
    }

    if !snapshot.change_log.is_empty() {
        println!();
        println!("{}", "Recent changes:".bold());
        for entry in &snapshot.change_log {
            println!("  {} {}", entry.at.format("%H:%M:%S").to_string().dimmed(), entry.summary);
        }
    }
}

fn print_alert_history(alerts: &[AlertItem]) {
    if alerts.is_empty() {
        println!("{}", "No alerts raised".green());
    }
    for alert in alerts {
        let state = match alert.closed_at {
            Some(closed) => format!("closed {}", closed.format("%H:%M:%S")).dimmed(),
            None => "open".bold(),
        };
        println!(
            "{} {} {} {}",
            paint_severity(alert.severity),
            alert.raised_at.format("%Y-%m-%d %H:%M:%S"),
            state,
            alert.title
        );
        println!("     {}", alert.detail.dimmed());
    }
}

fn print_group(title: &str, cards: &[MetricCard]) {
    println!();
    println!("{}", format!("{}:", title).bold());
    for card in cards {
        let value = match card.value {
            Some(v) => format!("{:.1}{}", v, card.unit),
            None => "n/a".to_string(),
        };
        println!("  {} {:<28} {:>10}", paint_metric(card.status), card.label, value);
        if let Some(note) = &card.note {
            println!("       {}", note.dimmed());
        }
    }
}

fn paint_metric(status: MetricStatus) -> ColoredString {
    match status {
        MetricStatus::Ok => "ok  ".green(),
        MetricStatus::Warn => "warn".yellow(),
        MetricStatus::Bad => "bad ".red(),
    }
}

fn paint_severity(severity: AlertSeverity) -> ColoredString {
    let label = severity.to_string();
    match severity {
        AlertSeverity::P0 => label.red().bold(),
        AlertSeverity::P1 => label.red(),
        AlertSeverity::P2 => label.yellow(),
        AlertSeverity::P3 => label.normal(),
    }
}

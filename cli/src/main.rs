// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Goldthread CLI
//!
//! The `goldthread` binary serves the workflow tracker, golden thread
//! validation and evidence telemetry over HTTP, and doubles as the
//! operator client for a running daemon.
//!
//! ## Commands
//!
//! - `goldthread serve` - Run the daemon in the foreground
//! - `goldthread status` - Health check against a running daemon
//! - `goldthread workflow list|show|signal` - Workflow operations
//! - `goldthread validate datasets|run|latest|history|show` - Golden thread runs
//! - `goldthread evidence [--range 24h] [--alerts]` - Evidence dashboard and alert history
//! - `goldthread config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use goldthread_core::domain::node_config::NodeConfigManifest;

use goldthread_cli::commands::{self, ConfigCommand, EvidenceArgs, ValidateCommand, WorkflowCommand};
use goldthread_cli::daemon::{self, DaemonClient, DaemonStatus, ServeOptions, DEFAULT_PORT};

/// Goldthread - workflow tracking and golden thread evidence
#[derive(Parser)]
#[command(name = "goldthread")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "GT_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// HTTP API port (default: from config, else 8400)
    #[arg(long, global = true, env = "GT_PORT")]
    port: Option<u16>,

    /// HTTP API host (default: from config, else 127.0.0.1)
    #[arg(long, global = true, env = "GT_HOST")]
    host: Option<String>,

    /// Log level (trace, debug, info, warn, error; default: from config, else info)
    #[arg(long, global = true, env = "GT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log output format (default: from config, else compact)
    #[arg(long, global = true, env = "GT_LOG_FORMAT", value_enum)]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Compact,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon in the foreground
    #[command(name = "serve")]
    Serve,

    /// Check whether a daemon is answering
    #[command(name = "status")]
    Status,

    /// Workflow tracking
    #[command(name = "workflow")]
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommand,
    },

    /// Golden thread validation runs
    #[command(name = "validate")]
    Validate {
        #[command(subcommand)]
        command: ValidateCommand,
    },

    /// Evidence dashboard snapshot
    #[command(name = "evidence")]
    Evidence(EvidenceArgs),

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let logging = NodeConfigManifest::load_or_default(cli.config.clone())
        .ok()
        .and_then(|config| config.spec.observability)
        .and_then(|observability| observability.logging);
    let level = cli
        .log_level
        .clone()
        .or_else(|| logging.as_ref().map(|l| l.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let format = cli.log_format.unwrap_or(match logging.as_ref().map(|l| l.format.as_str()) {
        Some("json") => LogFormat::Json,
        _ => LogFormat::Compact,
    });
    init_logging(&level, format)?;

    let client = || {
        DaemonClient::new(
            cli.host.as_deref().unwrap_or("127.0.0.1"),
            cli.port.unwrap_or(DEFAULT_PORT),
        )
    };

    match cli.command {
        Some(Commands::Serve) => {
            info!("Starting goldthread daemon");
            daemon::start_daemon(ServeOptions {
                config_path: cli.config.clone(),
                host: cli.host.clone(),
                port: cli.port,
            })
            .await
        }
        Some(Commands::Status) => {
            let client = client()?;
            match daemon::check_daemon_running(&client).await? {
                DaemonStatus::Running { uptime, version } => {
                    println!("{} {}", "✓ Daemon running at".green(), client.base_url());
                    if let Some(version) = version {
                        println!("  Version: {}", version);
                    }
                    if let Some(uptime) = uptime {
                        println!("  Uptime: {}s", uptime);
                    }
                    Ok(())
                }
                DaemonStatus::Stopped { reason } => {
                    println!("{} {}", "✗ Daemon not reachable at".red(), client.base_url());
                    println!("  {}", reason.dimmed());
                    std::process::exit(1);
                }
            }
        }
        Some(Commands::Workflow { command }) => commands::workflow::handle_command(command, &client()?).await,
        Some(Commands::Validate { command }) => commands::validate::handle_command(command, &client()?).await,
        Some(Commands::Evidence(args)) => commands::evidence::handle_command(args, &client()?).await,
        Some(Commands::Config { command }) => commands::config::handle_command(command, cli.config.clone()).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Compact => builder.compact().init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}

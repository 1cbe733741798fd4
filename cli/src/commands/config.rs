// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use goldthread_core::domain::node_config::NodeConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./goldthread-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output } => generate(output),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = NodeConfigManifest::load_or_default(config_override.clone()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. GT_CONFIG_PATH: {}",
            std::env::var("GT_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./goldthread-config.yaml");
        println!("  4. ~/.goldthread/config.yaml");
        println!("  5. /etc/goldthread/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Node:".bold());
    println!("  Name: {}", config.metadata.name);
    println!("  Listen: {}:{}", spec.network.bind_address, spec.network.port);
    println!(
        "  Storage: {}",
        if spec.database.is_some() { "postgres" } else { "in-memory" }
    );
    println!();

    println!("{}", "Execution substrate:".bold());
    println!("  Endpoint: {}", spec.substrate.endpoint);
    println!(
        "  Signal retries: {} (base delay {}ms)",
        spec.tracker.signal_retries, spec.tracker.signal_retry_delay_ms
    );
    println!();

    println!("{}", "Signals:".bold());
    for transition in config.signal_mapping().transitions() {
        let from: Vec<&str> = transition.from.iter().map(|s| s.as_str()).collect();
        println!("  {} : {} → {}", transition.signal.bold(), from.join("|"), transition.to);
    }
    println!();

    println!("{}", "Collaborators:".bold());
    let c = &spec.collaborators;
    println!("  Auth: {}", c.auth_endpoint);
    println!("  Ingestion: {}", c.ingestion_endpoint);
    println!("  Memory: {}", c.memory_endpoint);
    println!("  Conversation: {}", c.conversation_endpoint);
    println!("  Output gate: {}", c.gate_endpoint);
    println!();

    println!("{}", "Golden thread:".bold());
    println!("  Run timeout: {}s", spec.validation.run_timeout_secs);
    println!("  Audit acceptance runs: {}", spec.validation.audit_acceptance_runs);
    if let Some(dir) = &spec.validation.dataset_dir {
        println!("  Dataset dir: {}", dir.display());
    }
    println!();

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = NodeConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: PathBuf) -> Result<()> {
    NodeConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!("{}", format!("✓ Configuration generated: {}", output.display()).green());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_config_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("goldthread-config.yaml");

        generate(path.clone()).unwrap();
        validate(Some(path)).unwrap();
    }

    #[test]
    fn test_validate_rejects_wrong_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(
            &path,
            "apiVersion: goldthread.dev/v1\nkind: AgentManifest\nmetadata:\n  name: n1\nspec: {}\n",
        )
        .unwrap();

        let err = validate(Some(path)).unwrap_err();
        assert!(format!("{:#}", err).contains("Invalid kind"));
    }
}

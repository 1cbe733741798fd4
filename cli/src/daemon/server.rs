// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Daemon HTTP server implementation
//!
//! Wires configuration, persistence, the execution substrate client, the
//! collaborator adapters and the three services behind the core router.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use goldthread_core::{
    application::{alert_ledger::AlertLedger, EvidenceTelemetryService, GoldenThreadService, WorkflowTracker},
    domain::{
        node_config::{MetricsConfig, NodeConfigManifest},
        repository::{GoldenRunRepository, WorkflowRepository},
    },
    infrastructure::{
        datasets::DatasetCatalog,
        db::Database,
        event_bus::EventBus,
        evidence_recorder::{ChangeLog, EvidenceRecorder},
        http_collaborators,
        metrics_feed::InMemoryMetricsFeed,
        repositories::{
            InMemoryGoldenRunRepository, InMemoryWorkflowRepository, PostgresGoldenRunRepository,
            PostgresWorkflowRepository,
        },
        HttpSubstrateClient, RetryingSubstrate,
    },
    presentation::{app, AppState},
};

/// How often alerts are re-evaluated with nobody viewing the dashboard.
const ALERT_EVALUATION_PERIOD: Duration = Duration::from_secs(30);

pub struct ServeOptions {
    pub config_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

pub async fn start_daemon(options: ServeOptions) -> Result<()> {
    let config = NodeConfigManifest::load_or_default(options.config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;
    let spec = &config.spec;

    info!("Configuration loaded: node={}", config.metadata.name);

    if let Some(metrics) = spec.observability.as_ref().and_then(|o| o.metrics.as_ref()) {
        install_metrics_exporter(metrics)?;
    }

    // Persistence
    let (workflows, runs): (Arc<dyn WorkflowRepository>, Arc<dyn GoldenRunRepository>) = match &spec.database {
        Some(db_config) => {
            let db = Database::new(db_config).await?;
            db.migrate().await?;
            info!("Using PostgreSQL repositories");
            (
                Arc::new(PostgresWorkflowRepository::new_with_pool(db.get_pool().clone())),
                Arc::new(PostgresGoldenRunRepository::new_with_pool(db.get_pool().clone())),
            )
        }
        None => {
            warn!("No database configured; workflow and golden run history will not survive a restart");
            (
                Arc::new(InMemoryWorkflowRepository::new()),
                Arc::new(InMemoryGoldenRunRepository::new()),
            )
        }
    };

    // Execution substrate
    let substrate = Arc::new(
        HttpSubstrateClient::new(&spec.substrate.endpoint, spec.substrate.timeout_ms)
            .context("Failed to build execution substrate client")?,
    );
    let substrate = Arc::new(RetryingSubstrate::new(
        substrate,
        spec.tracker.signal_retries,
        spec.tracker.signal_retry_delay_ms,
    ));
    info!("Execution substrate: {}", spec.substrate.endpoint);

    let event_bus = Arc::new(EventBus::with_default_capacity());
    let tracker = Arc::new(WorkflowTracker::new(
        workflows,
        substrate,
        event_bus.clone(),
        config.signal_mapping(),
        &spec.tracker,
    ));

    let catalog = match &spec.validation.dataset_dir {
        Some(dir) => DatasetCatalog::with_directory(dir),
        None => DatasetCatalog::seeded(),
    };
    let collaborators = http_collaborators(&spec.collaborators).context("Failed to build collaborator clients")?;
    let golden_thread = Arc::new(GoldenThreadService::new(
        catalog,
        collaborators,
        tracker.clone(),
        runs.clone(),
        event_bus.clone(),
        spec.validation.clone(),
    ));

    // Telemetry: the recorder turns domain events into samples, external
    // sources post the rest.
    let feed = Arc::new(InMemoryMetricsFeed::new(spec.telemetry.sample_capacity));
    let change_log = Arc::new(ChangeLog::new(spec.telemetry.change_log_len));
    let recorder = EvidenceRecorder::new(feed.clone(), change_log.clone()).spawn(&event_bus);

    let telemetry = Arc::new(
        EvidenceTelemetryService::new(
            feed.clone(),
            Arc::new(AlertLedger::new()),
            runs,
            change_log,
            event_bus.clone(),
            spec.telemetry.clone(),
        )
        .with_tracker(tracker.clone()),
    );
    let evaluator = telemetry.clone().spawn_evaluator(ALERT_EVALUATION_PERIOD);

    let router = app(AppState {
        tracker,
        golden_thread,
        telemetry,
        samples: feed,
        start_time: Instant::now(),
    });

    let host = options.host.unwrap_or_else(|| spec.network.bind_address.clone());
    let port = options.port.unwrap_or(spec.network.port);
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Daemon listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    evaluator.abort();
    recorder.abort();
    info!("Daemon shutting down");

    Ok(())
}

fn install_metrics_exporter(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }
    let addr: SocketAddr = format!("0.0.0.0:{}", config.port)
        .parse()
        .context("Invalid metrics listen address")?;
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!("Prometheus metrics exposed on {}{}", addr, config.path);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Node Configuration Types
//
// Defines the configuration schema for a goldthread control-plane node:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Execution substrate and collaborator endpoints
// - Tracker, validation and telemetry tuning
// - Signal-to-transition mapping
// - Network, persistence and observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::workflow::{SignalMapping, SignalTransition};

pub const API_VERSION: &str = "goldthread.dev/v1";
pub const KIND: &str = "NodeConfig";

/// Top-level Kubernetes-style node configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfigManifest {
    /// API version (must be "goldthread.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "NodeConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: NodeConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Node configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfigSpec {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub substrate: SubstrateConfig,

    #[serde(default)]
    pub collaborators: CollaboratorsConfig,

    /// PostgreSQL persistence; in-memory repositories when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseConfig>,

    #[serde(default)]
    pub tracker: TrackerConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,

    /// Signal-to-transition table; the built-in approve/cancel/reject
    /// mapping applies when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signal_mappings: Vec<SignalTransition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// HTTP API port
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstrateConfig {
    /// Base URL of the durable-execution substrate's HTTP gateway
    #[serde(default = "default_substrate_endpoint")]
    pub endpoint: String,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SubstrateConfig {
    fn default() -> Self {
        Self {
            endpoint: default_substrate_endpoint(),
            timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaboratorsConfig {
    #[serde(default = "default_auth_endpoint")]
    pub auth_endpoint: String,

    #[serde(default = "default_ingestion_endpoint")]
    pub ingestion_endpoint: String,

    #[serde(default = "default_memory_endpoint")]
    pub memory_endpoint: String,

    #[serde(default = "default_conversation_endpoint")]
    pub conversation_endpoint: String,

    #[serde(default = "default_gate_endpoint")]
    pub gate_endpoint: String,

    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CollaboratorsConfig {
    fn default() -> Self {
        Self {
            auth_endpoint: default_auth_endpoint(),
            ingestion_endpoint: default_ingestion_endpoint(),
            memory_endpoint: default_memory_endpoint(),
            conversation_endpoint: default_conversation_endpoint(),
            gate_endpoint: default_gate_endpoint(),
            timeout_ms: default_request_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Upper bound on `limit` for list queries
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// How long a substrate query result is reused across pollers
    #[serde(default = "default_poll_cache_ttl")]
    pub poll_cache_ttl_secs: u64,

    /// Signal delivery retries before surfacing upstream_unavailable
    #[serde(default = "default_max_retries")]
    pub signal_retries: u32,

    /// Base delay, doubled on every retry
    #[serde(default = "default_retry_delay")]
    pub signal_retry_delay_ms: u64,

    /// A running/waiting workflow untouched for this long counts as stuck
    #[serde(default = "default_stuck_after")]
    pub stuck_after_secs: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_page_size: default_max_page_size(),
            poll_cache_ttl_secs: default_poll_cache_ttl(),
            signal_retries: default_max_retries(),
            signal_retry_delay_ms: default_retry_delay(),
            stuck_after_secs: default_stuck_after(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Bound on a whole golden run
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    /// Whether acceptance-mode runs go to the compliance audit channel
    #[serde(default)]
    pub audit_acceptance_runs: bool,

    /// Credentials the auth gate check presents for the authenticated probe
    #[serde(default = "default_probe_credentials")]
    pub probe_credentials: String,

    /// Directory of extra dataset fixtures (`*.txt`, `*.md`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_dir: Option<PathBuf>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            run_timeout_secs: default_run_timeout(),
            audit_acceptance_runs: false,
            probe_credentials: default_probe_credentials(),
            dataset_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Snapshot reuse window; capped by each range's minimum refresh
    #[serde(default = "default_snapshot_cache")]
    pub snapshot_cache_secs: u64,

    /// Entries kept in the snapshot's recent change-log
    #[serde(default = "default_change_log_len")]
    pub change_log_len: usize,

    /// Samples retained per metric in the in-memory feed
    #[serde(default = "default_sample_capacity")]
    pub sample_capacity: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            snapshot_cache_secs: default_snapshot_cache(),
            change_log_len: default_change_log_len(),
            sample_capacity: default_sample_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus exposition
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,

    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    200
}

fn default_max_page_size() -> usize {
    100
}

fn default_poll_cache_ttl() -> u64 {
    5
}

fn default_stuck_after() -> u64 {
    3600
}

fn default_run_timeout() -> u64 {
    120
}

fn default_probe_credentials() -> String {
    "golden-thread-probe".to_string()
}

fn default_snapshot_cache() -> u64 {
    20
}

fn default_change_log_len() -> usize {
    10
}

fn default_sample_capacity() -> usize {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_connections() -> u32 {
    5
}

fn default_substrate_endpoint() -> String {
    "http://localhost:7243".to_string()
}

fn default_auth_endpoint() -> String {
    "http://localhost:8101".to_string()
}

fn default_ingestion_endpoint() -> String {
    "http://localhost:8102".to_string()
}

fn default_memory_endpoint() -> String {
    "http://localhost:8103".to_string()
}

fn default_conversation_endpoint() -> String {
    "http://localhost:8104".to_string()
}

fn default_gate_endpoint() -> String {
    "http://localhost:8105".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9091
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8400
}

impl Default for NodeConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "goldthread-node".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: NodeConfigSpec::default(),
        }
    }
}

impl NodeConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. GT_CONFIG_PATH environment variable
    /// 2. ./goldthread-config.yaml (working directory)
    /// 3. ~/.goldthread/config.yaml (user home)
    /// 4. /etc/goldthread/config.yaml (system, Unix) or C:\ProgramData\Goldthread\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GT_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./goldthread-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".goldthread").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/goldthread/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Goldthread\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing/invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("GT_SUBSTRATE_URL") {
            tracing::info!("Environment override: GT_SUBSTRATE_URL={}", url);
            self.spec.substrate.endpoint = url;
        }

        if let Ok(url) = std::env::var("GT_DATABASE_URL") {
            tracing::info!("Environment override: GT_DATABASE_URL set");
            match self.spec.database.as_mut() {
                Some(db) => db.url = url,
                None => {
                    self.spec.database = Some(DatabaseConfig {
                        url,
                        max_connections: default_max_connections(),
                    })
                }
            }
        }

        if let Ok(val) = std::env::var("GT_AUDIT_ACCEPTANCE_RUNS") {
            match parse_flag(&val) {
                Some(flag) => {
                    tracing::info!("Environment override: GT_AUDIT_ACCEPTANCE_RUNS={}", flag);
                    self.spec.validation.audit_acceptance_runs = flag;
                }
                None => tracing::warn!(
                    "Invalid value for GT_AUDIT_ACCEPTANCE_RUNS: '{}'. Expected true/false. Ignoring.",
                    val
                ),
            }
        }
    }

    /// The effective signal table.
    pub fn signal_mapping(&self) -> SignalMapping {
        if self.spec.signal_mappings.is_empty() {
            SignalMapping::default()
        } else {
            SignalMapping::new(self.spec.signal_mappings.clone())
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.substrate.endpoint.is_empty() {
            anyhow::bail!("spec.substrate.endpoint cannot be empty");
        }

        let c = &self.spec.collaborators;
        for (name, endpoint) in [
            ("auth_endpoint", &c.auth_endpoint),
            ("ingestion_endpoint", &c.ingestion_endpoint),
            ("memory_endpoint", &c.memory_endpoint),
            ("conversation_endpoint", &c.conversation_endpoint),
            ("gate_endpoint", &c.gate_endpoint),
        ] {
            if endpoint.is_empty() {
                anyhow::bail!("spec.collaborators.{} cannot be empty", name);
            }
        }

        if self.spec.tracker.max_page_size == 0 {
            anyhow::bail!("spec.tracker.max_page_size must be at least 1");
        }

        if self.spec.validation.run_timeout_secs == 0 {
            anyhow::bail!("spec.validation.run_timeout_secs must be at least 1");
        }

        if let Some(db) = &self.spec.database {
            if db.url.is_empty() {
                anyhow::bail!("spec.database.url cannot be empty");
            }
        }

        let mut seen = std::collections::HashSet::new();
        for mapping in &self.spec.signal_mappings {
            if mapping.signal.is_empty() {
                anyhow::bail!("signal_mappings entries need a signal name");
            }
            if !seen.insert(mapping.signal.as_str()) {
                anyhow::bail!("Signal '{}' is mapped more than once", mapping.signal);
            }
            if mapping.from.is_empty() {
                anyhow::bail!("Signal '{}' must list at least one source state", mapping.signal);
            }
            if let Some(bad) = mapping.from.iter().find(|s| !s.can_transition_to(mapping.to)) {
                anyhow::bail!(
                    "Signal '{}' maps {} -> {}, which is not a lifecycle edge",
                    mapping.signal,
                    bad,
                    mapping.to
                );
            }
        }

        Ok(())
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::workflow::WorkflowStatus;

    #[test]
    fn test_default_manifest() {
        let manifest = NodeConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert!(!manifest.metadata.name.is_empty());
        assert_eq!(manifest.spec.tracker.max_page_size, 100);
        assert_eq!(manifest.spec.tracker.poll_cache_ttl_secs, 5);
        assert_eq!(manifest.spec.telemetry.snapshot_cache_secs, 20);
        assert!(!manifest.spec.validation.audit_acceptance_runs);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
apiVersion: goldthread.dev/v1
kind: NodeConfig
metadata:
  name: test-node
spec:
  substrate:
    endpoint: http://substrate:7243
  validation:
    audit_acceptance_runs: true
"#;
        let manifest = NodeConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.spec.substrate.endpoint, "http://substrate:7243");
        assert!(manifest.spec.validation.audit_acceptance_runs);
        assert_eq!(manifest.spec.validation.run_timeout_secs, 120);
        assert_eq!(manifest.spec.network.port, 8400);
        assert!(manifest.spec.database.is_none());
        assert_eq!(manifest.signal_mapping(), SignalMapping::default());
    }

    #[test]
    fn test_custom_signal_mapping() {
        let yaml = r#"
apiVersion: goldthread.dev/v1
kind: NodeConfig
metadata:
  name: test-node
spec:
  signal_mappings:
    - signal: approve
      from: [waiting]
      to: running
    - signal: reject-with-reason
      from: [waiting]
      to: cancelled
"#;
        let manifest = NodeConfigManifest::from_yaml_str(yaml).unwrap();
        assert!(manifest.validate().is_ok());
        let mapping = manifest.signal_mapping();
        assert_eq!(mapping.resolve("reject-with-reason").unwrap().to, WorkflowStatus::Cancelled);
        assert!(mapping.resolve("cancel").is_none());
    }

    #[test]
    fn test_validation() {
        let mut manifest = NodeConfigManifest::default();

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "WrongKind".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.metadata.name = "".to_string();
        assert!(manifest.validate().is_err());
        manifest.metadata.name = "test-node".to_string();

        manifest.spec.tracker.max_page_size = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.tracker.max_page_size = 50;

        // completed has no outgoing edges
        manifest.spec.signal_mappings.push(SignalTransition {
            signal: "reopen".to_string(),
            from: vec![WorkflowStatus::Completed],
            to: WorkflowStatus::Running,
        });
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("goldthread-config.yaml");
        let mut manifest = NodeConfigManifest::default();
        manifest.spec.tracker.signal_retries = 7;
        manifest.to_yaml_file(&path).unwrap();

        let loaded = NodeConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.spec.tracker.signal_retries, 7);
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let result = NodeConfigManifest::load_or_default(Some(PathBuf::from("/nonexistent/gt.yaml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("ON"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}

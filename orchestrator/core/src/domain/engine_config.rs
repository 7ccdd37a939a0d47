// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Engine Configuration Types
//
// Defines the configuration schema for a Conduit engine node:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Scheduler, propagation, dispatcher and cleanup cadences
// - Storage backend selection
// - API binding and observability settings

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::repository::{PostgresConfig, StorageBackend};

pub const API_VERSION: &str = "conduit.dev/v1";
pub const KIND: &str = "EngineConfig";

/// Top-level Kubernetes-style engine configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfigManifest {
    /// API version (must be "conduit.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "EngineConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: EngineConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable node name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfigSpec {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub propagation: PropagationConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub cleanup: CleanupConfig,

    #[serde(default)]
    pub logs: LogRetentionConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How often the scheduler wakes up; each wall-clock minute runs once.
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,

    /// Offset schedules are evaluated in (e.g. "+02:00")
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_propagation_interval")]
    pub interval_seconds: u64,

    /// Wake the propagator as soon as any agent emits events
    #[serde(default = "default_true")]
    pub propagate_on_emit: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Upper bound on agent invocations running at once
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cleanup_interval")]
    pub interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRetentionConfig {
    /// Newest log entries kept per agent
    #[serde(default = "default_logs_per_agent")]
    pub max_per_agent: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_kind")]
    pub backend: StorageKind,

    /// Connection string (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
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
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_tick_seconds() -> u64 {
    15
}

fn default_utc_offset() -> String {
    "+00:00".to_string()
}

fn default_propagation_interval() -> u64 {
    60
}

fn default_max_concurrency() -> usize {
    8
}

fn default_cleanup_interval() -> u64 {
    3600
}

fn default_logs_per_agent() -> usize {
    200
}

fn default_storage_kind() -> StorageKind {
    StorageKind::Memory
}

fn default_max_connections() -> u32 {
    5
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_seconds: default_tick_seconds(),
            utc_offset: default_utc_offset(),
        }
    }
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_propagation_interval(),
            propagate_on_emit: true,
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_cleanup_interval(),
        }
    }
}

impl Default for LogRetentionConfig {
    fn default() -> Self {
        Self {
            max_per_agent: default_logs_per_agent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageKind::Memory,
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

impl Default for EngineConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "conduit".to_string(),
                version: None,
            },
            spec: EngineConfigSpec::default(),
        }
    }
}

impl EngineConfigManifest {
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

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. CONDUIT_CONFIG_PATH environment variable
    /// 2. ./conduit-config.yaml (working directory)
    /// 3. ~/.conduit/config.yaml (user home)
    /// 4. /etc/conduit/config.yaml (system, Unix) or C:\ProgramData\Conduit\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("CONDUIT_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./conduit-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".conduit").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/conduit/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Conduit\\config.yaml");

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
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
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
        if let Ok(url) = std::env::var("CONDUIT_DATABASE_URL") {
            tracing::info!("Environment override: CONDUIT_DATABASE_URL (postgres backend)");
            self.spec.storage.backend = StorageKind::Postgres;
            self.spec.storage.database_url = Some(url);
        }

        if let Ok(val) = std::env::var("CONDUIT_MAX_CONCURRENCY") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => {
                    tracing::info!("Environment override: CONDUIT_MAX_CONCURRENCY={}", n);
                    self.spec.dispatcher.max_concurrency = n;
                }
                _ => {
                    tracing::warn!(
                        "Invalid value for CONDUIT_MAX_CONCURRENCY: '{}'. Expected a positive integer. Ignoring.",
                        val
                    );
                }
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.scheduler.tick_seconds == 0 || self.spec.scheduler.tick_seconds > 60 {
            anyhow::bail!("spec.scheduler.tick_seconds must be between 1 and 60");
        }

        self.utc_offset()?;

        if self.spec.propagation.interval_seconds == 0 {
            anyhow::bail!("spec.propagation.interval_seconds must be greater than 0");
        }

        if self.spec.dispatcher.max_concurrency == 0 {
            anyhow::bail!("spec.dispatcher.max_concurrency must be greater than 0");
        }

        if self.spec.cleanup.interval_seconds == 0 {
            anyhow::bail!("spec.cleanup.interval_seconds must be greater than 0");
        }

        if self.spec.storage.backend == StorageKind::Postgres && self.spec.storage.database_url.is_none() {
            anyhow::bail!("spec.storage.database_url is required for the postgres backend");
        }

        Ok(())
    }

    /// Offset schedules are evaluated in
    pub fn utc_offset(&self) -> anyhow::Result<FixedOffset> {
        self.spec
            .scheduler
            .utc_offset
            .parse::<FixedOffset>()
            .map_err(|e| anyhow::anyhow!("Invalid spec.scheduler.utc_offset '{}': {}", self.spec.scheduler.utc_offset, e))
    }

    /// Resolve the storage backend, expanding "env:VAR" connection strings
    pub fn storage_backend(&self) -> anyhow::Result<StorageBackend> {
        match self.spec.storage.backend {
            StorageKind::Memory => Ok(StorageBackend::InMemory),
            StorageKind::Postgres => {
                let raw = self
                    .spec
                    .storage
                    .database_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("spec.storage.database_url is not set"))?;
                let connection_string = match raw.strip_prefix("env:") {
                    Some(var) => std::env::var(var)
                        .map_err(|_| anyhow::anyhow!("Environment variable {} is not set", var))?,
                    None => raw.to_string(),
                };
                Ok(StorageBackend::PostgreSQL(PostgresConfig {
                    connection_string,
                    max_connections: self.spec.storage.max_connections,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfigManifest::default();
        config.validate().unwrap();
        assert_eq!(config.spec.dispatcher.max_concurrency, 8);
        assert_eq!(config.storage_backend().unwrap(), StorageBackend::InMemory);
    }

    #[test]
    fn test_parse_minimal_yaml() {
        let yaml = r#"
apiVersion: conduit.dev/v1
kind: EngineConfig
metadata:
  name: edge-1
spec:
  scheduler:
    utc_offset: "+02:00"
  dispatcher:
    max_concurrency: 3
"#;
        let config = EngineConfigManifest::from_yaml_str(yaml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.metadata.name, "edge-1");
        assert_eq!(config.spec.dispatcher.max_concurrency, 3);
        assert_eq!(config.spec.scheduler.tick_seconds, 15);
        assert_eq!(config.utc_offset().unwrap().local_minus_utc(), 7200);
    }

    #[test]
    fn test_rejects_wrong_kind_and_bad_offset() {
        let mut config = EngineConfigManifest::default();
        config.kind = "NodeConfig".into();
        assert!(config.validate().is_err());

        let mut config = EngineConfigManifest::default();
        config.spec.scheduler.utc_offset = "somewhere".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_postgres_requires_url() {
        let mut config = EngineConfigManifest::default();
        config.spec.storage.backend = StorageKind::Postgres;
        assert!(config.validate().is_err());

        config.spec.storage.database_url = Some("postgres://localhost/conduit".into());
        config.validate().unwrap();
        match config.storage_backend().unwrap() {
            StorageBackend::PostgreSQL(pg) => {
                assert_eq!(pg.connection_string, "postgres://localhost/conduit");
                assert_eq!(pg.max_connections, 5);
            }
            other => panic!("unexpected backend {:?}", other),
        }
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "apiVersion: conduit.dev/v1\nkind: EngineConfig\nmetadata:\n  name: from-file\n"
        )
        .unwrap();

        let config = EngineConfigManifest::load_or_default(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.metadata.name, "from-file");
    }

    #[test]
    fn test_round_trip_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conduit-config.yaml");
        let config = EngineConfigManifest::default();
        config.to_yaml_file(&path).unwrap();
        let loaded = EngineConfigManifest::from_yaml_file(&path).unwrap();
        assert_eq!(loaded.kind, KIND);
        assert_eq!(loaded.spec.api.port, 8000);
    }
}

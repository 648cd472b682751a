//! Configuration schema definitions.
//!
//! This module defines the complete settings structure for the sync daemon.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the sync daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SyncConfig {
    /// Refresh cycle settings.
    pub sync: SyncSettings,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

impl SyncConfig {
    /// Deployment mode, resolved once from the settings.
    ///
    /// An explicit `mode` wins; otherwise a configured management host means
    /// managed mode.
    pub fn deployment_mode(&self) -> DeploymentMode {
        match self.sync.mode {
            Some(mode) => mode,
            None if self.sync.management_host.is_some() => DeploymentMode::Managed,
            None => DeploymentMode::LocalAuthoring,
        }
    }
}

/// Where fragments come from and how they are classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    /// JSON bundles pulled from the management plane.
    Managed,
    /// Hand-authored YAML in a local directory.
    #[serde(rename = "local")]
    LocalAuthoring,
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeploymentMode::Managed => f.write_str("managed"),
            DeploymentMode::LocalAuthoring => f.write_str("local"),
        }
    }
}

/// Refresh cycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Management plane host (e.g., "apim.example.com:443"). Unset means no pull.
    pub management_host: Option<String>,

    /// Explicit deployment mode override.
    pub mode: Option<DeploymentMode>,

    /// Initial fallback directory; the authoring directory in local mode.
    pub config_dir: PathBuf,

    /// Directory under which fresh bundles are created.
    pub work_dir: PathBuf,

    /// File holding the persisted fallback pointer.
    pub pointer_file: PathBuf,

    /// Delay between the end of one cycle and the start of the next.
    pub refresh_interval_secs: u64,

    /// Upper bound on a single management-plane pull.
    pub fetch_timeout_secs: u64,

    /// How long startup waits for the first promotion.
    pub startup_timeout_secs: u64,

    /// Trigger an early cycle when the local authoring directory changes.
    pub watch_local: bool,
}

impl SyncSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            management_host: None,
            mode: None,
            config_dir: PathBuf::from("config/default"),
            work_dir: PathBuf::from("config"),
            pointer_file: PathBuf::from("config/.current"),
            refresh_interval_secs: 15,
            fetch_timeout_secs: 30,
            startup_timeout_secs: 60,
            watch_local: true,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty output for development, JSON for log aggregation.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

/// Placeholder key that validation refuses when the admin API is enabled.
pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_API_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

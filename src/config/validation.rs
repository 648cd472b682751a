//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, addresses parse)
//! - Check mode/host consistency
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SyncConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;
use url::Url;

use crate::config::schema::{DeploymentMode, SyncConfig, PLACEHOLDER_API_KEY};

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Turn a management host setting into a base URL.
///
/// Bare hosts (`apim.example.com:9443`) are assumed to speak HTTPS.
pub fn management_url(host: &str) -> Result<Url, url::ParseError> {
    if host.contains("://") {
        Url::parse(host)
    } else {
        Url::parse(&format!("https://{}", host))
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &SyncConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let sync = &config.sync;

    if sync.refresh_interval_secs == 0 {
        errors.push(ValidationError::new("sync.refresh_interval_secs", "must be greater than zero"));
    }
    if sync.fetch_timeout_secs == 0 {
        errors.push(ValidationError::new("sync.fetch_timeout_secs", "must be greater than zero"));
    }
    if sync.startup_timeout_secs == 0 {
        errors.push(ValidationError::new("sync.startup_timeout_secs", "must be greater than zero"));
    }

    match sync.management_host.as_deref() {
        Some(host) if host.trim().is_empty() => {
            errors.push(ValidationError::new("sync.management_host", "must not be empty"));
        }
        Some(host) => {
            if let Err(e) = management_url(host) {
                errors.push(ValidationError::new(
                    "sync.management_host",
                    format!("invalid host `{}`: {}", host, e),
                ));
            }
        }
        None if config.deployment_mode() == DeploymentMode::Managed => {
            errors.push(ValidationError::new(
                "sync.management_host",
                "managed mode requires a management host",
            ));
        }
        None => {}
    }

    if sync.pointer_file.as_os_str().is_empty() {
        errors.push(ValidationError::new("sync.pointer_file", "must not be empty"));
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address `{}`", obs.metrics_address),
        ));
    }

    let admin = &config.admin;
    if admin.enabled {
        if admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("invalid socket address `{}`", admin.bind_address),
            ));
        }
        if admin.api_key.is_empty() || admin.api_key == PLACEHOLDER_API_KEY {
            errors.push(ValidationError::new("admin.api_key", "must be set when the admin API is enabled"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

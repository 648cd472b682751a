//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::SyncConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable naming the management plane host.
pub const ENV_MANAGEMENT_HOST: &str = "APIMANAGER";

/// Environment variable naming the initial configuration directory.
pub const ENV_CONFIG_DIR: &str = "CONFIG_DIR";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, apply environment overrides, and validate configuration.
///
/// A missing file yields the defaults.
pub fn load_config(path: Option<&Path>) -> Result<SyncConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => SyncConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `APIMANAGER` and `CONFIG_DIR` overrides.
pub fn apply_env_overrides<F>(config: &mut SyncConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup(ENV_MANAGEMENT_HOST).filter(|v| !v.is_empty()) {
        tracing::debug!(host = %host, "Management host taken from environment");
        config.sync.management_host = Some(host);
    }
    if let Some(dir) = lookup(ENV_CONFIG_DIR).filter(|v| !v.is_empty()) {
        tracing::debug!(dir = %dir, "Config directory taken from environment");
        config.sync.config_dir = PathBuf::from(dir);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeploymentMode;
    use tempfile::TempDir;

    #[test]
    fn test_env_overrides() {
        let mut config = SyncConfig::default();
        apply_env_overrides(&mut config, |key| match key {
            ENV_MANAGEMENT_HOST => Some("apim.example.com".to_string()),
            ENV_CONFIG_DIR => Some("/srv/gw/config".to_string()),
            _ => None,
        });
        assert_eq!(config.sync.management_host.as_deref(), Some("apim.example.com"));
        assert_eq!(config.sync.config_dir, PathBuf::from("/srv/gw/config"));
        assert_eq!(config.deployment_mode(), DeploymentMode::Managed);
    }

    #[test]
    fn test_empty_env_ignored() {
        let mut config = SyncConfig::default();
        apply_env_overrides(&mut config, |_| Some(String::new()));
        assert!(config.sync.management_host.is_none());
        assert_eq!(config.sync.config_dir, PathBuf::from("config/default"));
    }

    #[test]
    fn test_invalid_file_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sync.toml");
        fs::write(&path, "[sync]\nrefresh_interval_secs = 0\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("refresh_interval_secs"));
    }

    #[test]
    fn test_malformed_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sync.toml");
        fs::write(&path, "[sync\n").unwrap();
        assert!(matches!(load_config(Some(&path)), Err(ConfigError::Parse(_))));
    }
}

//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! sync.toml (optional)
//!     → loader.rs (parse, APIMANAGER / CONFIG_DIR overrides)
//!     → validation.rs (semantic checks)
//!     → SyncConfig (validated, immutable)
//!     → deployment_mode() resolved once, passed explicitly
//!
//! Local authoring:
//!     watcher.rs detects fragment change
//!     → nudges the refresh scheduler (no reload of settings)
//! ```
//!
//! # Design Decisions
//! - Settings are immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::AdminConfig;
pub use schema::DeploymentMode;
pub use schema::ObservabilityConfig;
pub use schema::SyncConfig;
pub use schema::SyncSettings;

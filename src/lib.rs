//! Gateway configuration synchronization core.

pub mod admin;
pub mod bundle;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod refresh;
pub mod resolver;
pub mod snapshot;
pub mod store;

pub use config::schema::SyncConfig;
pub use error::SyncError;
pub use lifecycle::Shutdown;
pub use refresh::RefreshScheduler;
pub use snapshot::{SnapshotHandle, SnapshotRegistry};
pub use store::{ModelStore, ModelType};

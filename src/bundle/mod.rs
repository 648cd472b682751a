//! Bundle acquisition subsystem.
//!
//! # Data Flow
//! ```text
//! management host set (managed mode)?
//!     no  → FetchError::NoEndpoint, caller uses fallback directory
//!     yes → create <work_dir>/bundle-<uuid>
//!         → ManagementPlane::pull (bounded by fetch timeout)
//!         → ok:  bundle directory
//!         → err: directory removed, caller uses fallback directory
//!
//! After a fresh bundle is promoted:
//!     pointer.rs rewrites the persisted fallback pointer
//! ```
//!
//! # Design Decisions
//! - Fetch failures are never fatal; they only fail the current cycle
//! - Each pull gets its own directory so a half-written bundle is never read
//! - The management plane is a trait so the wire protocol stays swappable

pub mod fetcher;
pub mod pointer;
pub mod puller;

pub use fetcher::{remove_bundle, BundleFetcher, FetchError, BUNDLE_DIR_PREFIX};
pub use pointer::FallbackPointer;
pub use puller::{HttpPuller, ManagementPlane};

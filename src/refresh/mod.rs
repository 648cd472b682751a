//! Refresh scheduling subsystem.
//!
//! # Data Flow
//! ```text
//! scheduler.rs (one cycle at a time):
//!     → registry GC pass
//!     → BundleFetcher::fetch, else fallback directory
//!     → SnapshotRegistry::new_snapshot
//!     → FragmentResolver::resolve (blocking pool)
//!     → ModelStore::stage + bulk_insert per model type
//!     → seal + promote
//!         ok:  readiness (first time), pointer rewrite (fresh bundles)
//!         err: snapshot discarded, fresh bundle removed
//!     → sleep(period) | nudge | shutdown
//! ```
//!
//! # Design Decisions
//! - The next cycle is armed only after the previous one finishes, so
//!   cycles never overlap
//! - A failed cycle leaves the active snapshot untouched
//! - Nudges (file watcher, SIGHUP) shorten the pause, never interrupt a cycle

pub mod scheduler;

pub use scheduler::{
    BundleSource, CycleOutcome, ReadyEvent, RefreshScheduler, SchedulerSettings,
};

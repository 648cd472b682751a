//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast → scheduler stops between cycles → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Nudge an early refresh cycle
//! ```
//!
//! # Design Decisions
//! - A refresh cycle in flight always completes before the scheduler stops
//! - SIGHUP never bypasses cycle serialization; it only shortens the wait

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;

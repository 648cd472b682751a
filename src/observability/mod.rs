//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Refresh cycle, registry, resolver produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Snapshot ids flow through every log line of a cycle
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

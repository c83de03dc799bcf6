//! # Core Engine Module
//!
//! The state shared between the streaming consumer and the periodic
//! reporter, together with the error taxonomy both of them speak.
//!
//! ## Core Components:
//!
//! - **`watch_set`**: the owned status map of watched cell identifiers. The
//!   consumer marks entries, the reporter snapshots and resets them.
//! - **`errors`**: the tagged `PipelineError` used to decide between
//!   "log and continue" and "terminate the process".
//! - **`metrics`**: the Prometheus registry and its counters.
//! - **`reporter`**: the scheduled job that joins the watch set with a
//!   freshly fetched attribute per cell and logs a coverage summary.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Tagged pipeline errors and the process-termination policy.
pub mod errors;
/// Prometheus registry and application counters.
pub mod metrics;
/// The periodic PM-counter coverage reporter.
pub mod reporter;
/// The shared watched-identifier status map.
pub mod watch_set;

// --- Public API Re-exports ---
pub use errors::PipelineError;
pub use metrics::AppMetrics;
pub use reporter::{ReportGenerator, ReportSettings};
pub use watch_set::WatchSetTracker;

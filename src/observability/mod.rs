//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Router and hooks produce:
//!     → logging.rs (structured log events, transition spans)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log output (stdout, pretty or JSON)
//!     → Whatever recorder the host installs for the `metrics` facade
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Transition ID flows through every hook of one transition
//! - Metrics are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;

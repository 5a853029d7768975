//! Location collaborator.
//!
//! # Data Flow
//! ```text
//! LocationSource (browser history, in-memory history, ...)
//!     → subscribe(): successive locations in arrival order
//!     → Router intake queue
//!
//! Router (revert / redirect / consumer navigation)
//!     → push(ref) / replace(ref)
//!     → LocationSource applies and re-broadcasts
//! ```
//!
//! # Design Decisions
//! - The router never owns history; it only reads snapshots and asks for
//!   push/replace
//! - Subscribers receive every change, including the ones the router caused
//! - Failures are reported to the caller, never swallowed here

pub mod memory;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::MemoryHistory;
pub use types::Location;

/// Errors reported by a location collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    /// The reference could not be turned into a location.
    #[error("invalid reference '{reference}': {reason}")]
    Invalid { reference: String, reason: String },

    /// The collaborator refused or failed to apply the navigation.
    #[error("navigation to '{reference}' failed: {reason}")]
    Rejected { reference: String, reason: String },
}

/// Navigation/history object driving a router.
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Snapshot of the current location.
    fn current(&self) -> Location;

    /// Receive every subsequent location change in arrival order.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<Location>;

    /// Add a new history entry. Resolves once applied.
    async fn push(&self, reference: &str) -> Result<(), LocationError>;

    /// Replace the current history entry. Resolves once applied.
    async fn replace(&self, reference: &str) -> Result<(), LocationError>;
}

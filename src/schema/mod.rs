//! Schema subsystem.
//!
//! # Data Flow
//! ```text
//! RouterConfig.routes (ordered, nested)
//!     → tree.rs (recursive compile, pre-order arena)
//!     → node.rs (patterns compiled, groups resolved)
//!     → SchemaTree (immutable, shared by both match node sets)
//! ```
//!
//! # Design Decisions
//! - Built once per router; never mutated afterwards
//! - Any malformed pattern is fatal at construction
//! - Group membership is resolved here (inherit unless overridden)

pub mod node;
pub mod tree;

use thiserror::Error;

pub use node::{MatchPattern, NodeId, ParallelWhitelist, SchemaNode};
pub use tree::SchemaTree;

/// Errors raised while compiling a schema tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// Capture patterns are applied once per segment; a global flag makes no sense.
    #[error("pattern /{pattern}/ on '{node}' uses the global flag")]
    GlobalPattern { node: String, pattern: String },

    #[error("pattern on '{node}' uses unsupported flag '{flag}'")]
    UnknownFlag { node: String, flag: char },

    #[error("pattern /{pattern}/ on '{node}' is invalid: {reason}")]
    InvalidPattern {
        node: String,
        pattern: String,
        reason: String,
    },

    #[error("pattern /{pattern}/ on '{node}' has more than one capture group")]
    MultipleCaptures { node: String, pattern: String },

    #[error("group name on '{node}' is empty")]
    EmptyGroup { node: String },
}

//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Location
//!     → address.rs (split into per-group paths + passthrough query)
//!     → matcher.rs (one chain per group, parallel whitelist applied)
//!     → source.rs (chains published as an immutable RouteSource)
//!     → tree.rs (match nodes derive matched/exact/params from a source)
//! ```
//!
//! # Design Decisions
//! - Deterministic: same location always yields the same chains
//! - First declared route wins; ambiguity is never reported
//! - Readers never lock: sources are swapped whole

pub mod address;
pub mod matcher;
pub mod source;
pub mod tree;

pub use address::{decode_location, encode_ref, RouteRequest};
pub use matcher::{match_node, match_request, match_tree, SegmentMatch};
pub use source::{MatchEntry, Params, RouteSource, SourceCell};
pub use tree::{MatchNode, RouteTree, Side};

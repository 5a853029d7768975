//! Hierarchical route matching and transition lifecycle engine.
//!
//! A declarative tree of routes decides which nodes are active for a
//! location. Every change runs through a cancelable hook protocol before the
//! committed match state flips.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod location;
pub mod observability;
pub mod routing;
pub mod schema;

pub use config::{load_config, parse_config, RouteConfig, RouterConfig};
pub use error::RouterError;
pub use lifecycle::{HookContext, HookKind, HookOutcome, Router, Shutdown, TransitionOutcome};
pub use location::{Location, LocationError, LocationSource, MemoryHistory};
pub use routing::{MatchNode, Params};

//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Router (orchestrator.rs):
//!     LocationSource → intake queue → one transition at a time
//!
//! Transition (transition.rs):
//!     match → candidate → before hooks → commit → after hooks → notify
//!
//! Hooks (hooks.rs) and services (service.rs):
//!     per-node callbacks, outcome = Proceed | Cancel | Redirect
//!
//! Shutdown (shutdown.rs):
//!     trigger → Router::run returns after the current transition
//! ```
//!
//! # Design Decisions
//! - Committed state changes in exactly one place (transition commit)
//! - A hook failure never aborts a transition
//! - Shutdown is cooperative: a running transition finishes first

pub mod hooks;
pub mod orchestrator;
pub mod service;
pub mod shutdown;
pub mod transition;

pub use hooks::{hook, Hook, HookContext, HookError, HookKind, HookOutcome, HookResult};
pub use orchestrator::Router;
pub use service::{async_factory, sync_factory, RouteService, ServiceFactory};
pub use shutdown::Shutdown;
pub use transition::{LocationChange, TransitionOutcome};

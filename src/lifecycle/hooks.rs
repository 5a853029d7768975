//! Transition hooks.
//!
//! # Hook kinds
//! ```text
//! before_leave  → before_enter / before_update  → commit
//!     → after_leave → after_enter / after_update
//! ```
//!
//! # Design Decisions
//! - Outcomes are explicit: Proceed, Cancel or Redirect
//! - An `Err` (or a panic) is logged and counts as Proceed
//! - Outcomes of after-hooks are ignored; the commit already happened

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use thiserror::Error;
use uuid::Uuid;

use crate::location::Location;
use crate::observability::metrics;
use crate::routing::tree::MatchNode;

/// The six points of a transition where hooks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    BeforeLeave,
    BeforeEnter,
    BeforeUpdate,
    AfterLeave,
    AfterEnter,
    AfterUpdate,
}

impl HookKind {
    pub const ALL: [HookKind; 6] = [
        HookKind::BeforeLeave,
        HookKind::BeforeEnter,
        HookKind::BeforeUpdate,
        HookKind::AfterLeave,
        HookKind::AfterEnter,
        HookKind::AfterUpdate,
    ];

    /// Whether the outcome of this hook can stop a transition.
    pub fn is_before(self) -> bool {
        matches!(
            self,
            HookKind::BeforeLeave | HookKind::BeforeEnter | HookKind::BeforeUpdate
        )
    }

    /// Whether the node is part of the candidate state (entering or updating).
    pub fn is_arrival(self) -> bool {
        !matches!(self, HookKind::BeforeLeave | HookKind::AfterLeave)
    }

    /// The after-hook that follows this before-hook.
    pub fn after(self) -> HookKind {
        match self {
            HookKind::BeforeLeave | HookKind::AfterLeave => HookKind::AfterLeave,
            HookKind::BeforeEnter | HookKind::AfterEnter => HookKind::AfterEnter,
            HookKind::BeforeUpdate | HookKind::AfterUpdate => HookKind::AfterUpdate,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HookKind::BeforeLeave => "before_leave",
            HookKind::BeforeEnter => "before_enter",
            HookKind::BeforeUpdate => "before_update",
            HookKind::AfterLeave => "after_leave",
            HookKind::AfterEnter => "after_enter",
            HookKind::AfterUpdate => "after_update",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a hook decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// Let the transition continue.
    Proceed,
    /// Stop the transition and restore the last committed location.
    Cancel,
    /// Stop the transition and replace the location with the given ref.
    Redirect(String),
}

/// Error raised by a hook body or a service factory.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for HookError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for HookError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

pub type HookResult = Result<HookOutcome, HookError>;

/// Everything a hook gets to see about the transition it runs in.
#[derive(Clone)]
pub struct HookContext {
    pub kind: HookKind,
    /// The node as seen through the committed source.
    pub node: MatchNode,
    /// The same node as seen through the candidate source.
    pub candidate: MatchNode,
    /// Last committed location, if any.
    pub from: Option<Location>,
    /// Location being transitioned to.
    pub to: Location,
    /// Correlation id shared by every hook of one transition.
    pub transition_id: Uuid,
}

impl fmt::Debug for HookContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("kind", &self.kind)
            .field("node", &self.node.full_name())
            .field("from", &self.from)
            .field("to", &self.to)
            .field("transition_id", &self.transition_id)
            .finish()
    }
}

/// A registered hook callback.
pub type Hook = Arc<dyn Fn(HookContext) -> BoxFuture<'static, HookResult> + Send + Sync>;

/// Wrap an async closure into a [`Hook`].
pub fn hook<F, Fut>(f: F) -> Hook
where
    F: Fn(HookContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HookResult> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

/// Hook lists of one node, one list per kind.
#[derive(Default)]
pub struct HookRegistry {
    lists: RwLock<[Vec<Hook>; 6]>,
}

impl HookRegistry {
    pub fn register(&self, kind: HookKind, hook: Hook) {
        let mut lists = self.lists.write().unwrap_or_else(PoisonError::into_inner);
        lists[kind.index()].push(hook);
    }

    /// Registered hooks of `kind`, in registration order.
    pub fn snapshot(&self, kind: HookKind) -> Vec<Hook> {
        let lists = self.lists.read().unwrap_or_else(PoisonError::into_inner);
        lists[kind.index()].clone()
    }

    pub fn count(&self, kind: HookKind) -> usize {
        let lists = self.lists.read().unwrap_or_else(PoisonError::into_inner);
        lists[kind.index()].len()
    }
}

/// Await a hook body, turning errors and panics into `Proceed`.
pub(crate) async fn settle(
    kind: HookKind,
    node: &str,
    body: impl FnOnce() -> BoxFuture<'static, HookResult>,
) -> HookOutcome {
    let future = match std::panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(future) => future,
        Err(_) => {
            tracing::warn!(hook = %kind, node = %node, "Hook panicked while starting, proceeding");
            metrics::record_hook_failure(kind.as_str());
            return HookOutcome::Proceed;
        }
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            tracing::warn!(hook = %kind, node = %node, error = %e, "Hook failed, proceeding");
            metrics::record_hook_failure(kind.as_str());
            HookOutcome::Proceed
        }
        Err(_) => {
            tracing::warn!(hook = %kind, node = %node, "Hook panicked, proceeding");
            metrics::record_hook_failure(kind.as_str());
            HookOutcome::Proceed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert!(HookKind::BeforeUpdate.is_before());
        assert!(!HookKind::AfterEnter.is_before());
        assert!(!HookKind::BeforeLeave.is_arrival());
        assert_eq!(HookKind::BeforeUpdate.after(), HookKind::AfterUpdate);
        for (i, kind) in HookKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[tokio::test]
    async fn test_settle_maps_failures_to_proceed() {
        let ok = settle(HookKind::BeforeEnter, "n", || {
            async { Ok(HookOutcome::Cancel) }.boxed()
        })
        .await;
        assert_eq!(ok, HookOutcome::Cancel);

        let failed = settle(HookKind::BeforeEnter, "n", || {
            async { Err(HookError::new("boom")) }.boxed()
        })
        .await;
        assert_eq!(failed, HookOutcome::Proceed);

        let panicked = settle(HookKind::BeforeEnter, "n", || {
            async { panic!("hook exploded") }.boxed()
        })
        .await;
        assert_eq!(panicked, HookOutcome::Proceed);

        let eager_panic = settle(HookKind::BeforeLeave, "n", || panic!("before future")).await;
        assert_eq!(eager_panic, HookOutcome::Proceed);
    }
}

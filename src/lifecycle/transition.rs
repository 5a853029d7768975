//! One transition, from matched location to commit or revert.
//!
//! # Phases
//! ```text
//! match → publish candidate → plan
//!     → before_leave (deepest first)       ─┐ Cancel / Redirect → replace location
//!     → before_enter / before_update (root first) ─┘ newer intake → abandon
//!     → commit (single publish)
//!     → after_leave → after_enter / after_update → notify observers
//! ```
//!
//! # Design Decisions
//! - Only groups whose state changed take part in the plan
//! - Hooks of one batch run sequentially in tree order; the first
//!   non-proceed outcome ends the batch
//! - Staleness is checked after each batch, never mid-hook, and counts
//!   locations the collaborator delivered while the batch ran

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::RouterError;
use crate::lifecycle::hooks::{settle, HookContext, HookKind, HookOutcome};
use crate::lifecycle::orchestrator::RouterInner;
use crate::lifecycle::service::call_service;
use crate::location::Location;
use crate::observability::metrics;
use crate::routing::address::decode_location;
use crate::routing::matcher::match_request;
use crate::routing::source::RouteSource;
use crate::routing::tree::Side;
use crate::schema::{NodeId, SchemaTree};

/// How processing one location ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// Location equal to the committed one; nothing ran.
    Unchanged,
    /// Hooks proceeded and the new state is committed.
    Committed,
    /// A hook cancelled; the location was replaced with the last committed one.
    Cancelled,
    /// A hook redirected; the location was replaced with the hook's ref.
    Redirected,
    /// A newer location arrived while hooks ran; nothing was committed.
    Superseded,
}

impl TransitionOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            TransitionOutcome::Unchanged => "unchanged",
            TransitionOutcome::Committed => "committed",
            TransitionOutcome::Cancelled => "cancelled",
            TransitionOutcome::Redirected => "redirected",
            TransitionOutcome::Superseded => "superseded",
        }
    }
}

/// Notification sent to change observers after each commit.
#[derive(Debug, Clone, Serialize)]
pub struct LocationChange {
    pub previous: Option<Location>,
    pub next: Location,
    pub transition_id: Uuid,
}

type Step = (HookKind, NodeId);

/// Nodes whose hooks run, and the groups the commit copies over.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Plan {
    pub(crate) affected: Vec<String>,
    pub(crate) leaving: Vec<Step>,
    pub(crate) arriving: Vec<Step>,
}

impl Plan {
    pub(crate) fn new(schema: &SchemaTree, committed: &RouteSource, candidate: &RouteSource) -> Self {
        let mut plan = Plan::default();

        let query_changed = |id: NodeId| {
            schema
                .node(id)
                .query_keys()
                .iter()
                .any(|key| committed.query().get(key) != candidate.query().get(key))
        };

        let groups: BTreeSet<&String> = committed.groups().chain(candidate.groups()).collect();
        for group in groups {
            let before = committed.chain(group);
            let after = candidate.chain(group);
            let mut touched = committed.path(group) != candidate.path(group);

            for entry in before.iter().rev() {
                if !after.iter().any(|e| e.node == entry.node) {
                    plan.leaving.push((HookKind::BeforeLeave, entry.node));
                    touched = true;
                }
            }

            for entry in after {
                match before.iter().find(|e| e.node == entry.node) {
                    None => {
                        plan.arriving.push((HookKind::BeforeEnter, entry.node));
                        touched = true;
                    }
                    Some(old) if old != entry || query_changed(entry.node) => {
                        plan.arriving.push((HookKind::BeforeUpdate, entry.node));
                        touched = true;
                    }
                    Some(_) => {}
                }
            }

            if touched {
                plan.affected.push(group.clone());
            }
        }
        plan
    }
}

/// Process one location taken from the intake queue.
pub(crate) async fn run_transition(
    inner: &RouterInner,
    seq: u64,
    to: Location,
) -> Result<TransitionOutcome, RouterError> {
    let started = Instant::now();
    let transition = Transition {
        inner,
        seq,
        from: inner.committed_location.load_full().map(|l| (*l).clone()),
        to,
        id: Uuid::new_v4(),
    };

    let span = tracing::info_span!(
        "transition",
        id = %transition.id,
        seq = seq,
        to = %transition.to,
    );
    let result = transition.execute().instrument(span).await;

    match &result {
        Ok(outcome) => metrics::record_transition(outcome.as_str(), started),
        Err(_) => metrics::record_transition("failed", started),
    }
    result
}

struct Transition<'a> {
    inner: &'a RouterInner,
    seq: u64,
    from: Option<Location>,
    to: Location,
    id: Uuid,
}

impl Transition<'_> {
    async fn execute(&self) -> Result<TransitionOutcome, RouterError> {
        if self.from.as_ref().is_some_and(|from| from.same_as(&self.to)) {
            tracing::debug!("Location unchanged, skipping");
            return Ok(TransitionOutcome::Unchanged);
        }

        let tree = &self.inner.tree;
        let schema = tree.schema();

        let request = decode_location(&self.to, &self.inner.prefix, schema.primary_group());
        let (paths, chains) = match_request(schema, &request);
        let candidate_cell = tree.source(Side::Candidate);
        candidate_cell.publish(RouteSource::new(paths, chains, request.query));

        let candidate = candidate_cell.load();
        let committed = tree.source(Side::Committed).load();
        let plan = Plan::new(schema, &committed, &candidate);

        tracing::debug!(
            leaving = plan.leaving.len(),
            arriving = plan.arriving.len(),
            groups = ?plan.affected,
            "Transition planned"
        );

        for batch in [&plan.leaving, &plan.arriving] {
            let outcome = self.run_batch(batch).await;
            if self.superseded() {
                tracing::debug!("Newer location queued, abandoning");
                return Ok(TransitionOutcome::Superseded);
            }
            if outcome != HookOutcome::Proceed {
                return self.abort(outcome).await;
            }
        }

        let mut next = (*committed).clone();
        for group in &plan.affected {
            next.adopt_group(&candidate, group);
        }
        next.set_query(candidate.query().clone());
        self.inner
            .committed_location
            .store(Some(Arc::new(self.to.clone())));
        let version = tree.source(Side::Committed).publish(next);

        tracing::info!(version, "Transition committed");

        for &(kind, node) in plan.leaving.iter().chain(&plan.arriving) {
            self.run_step(kind.after(), node).await;
        }

        // No receivers is fine.
        let _ = self.inner.changes.send(LocationChange {
            previous: self.from.clone(),
            next: self.to.clone(),
            transition_id: self.id,
        });

        Ok(TransitionOutcome::Committed)
    }

    fn superseded(&self) -> bool {
        self.inner.absorb_events();
        self.inner.latest.load(Ordering::SeqCst) != self.seq
    }

    async fn run_batch(&self, steps: &[Step]) -> HookOutcome {
        for &(kind, node) in steps {
            let outcome = self.run_step(kind, node).await;
            if outcome != HookOutcome::Proceed {
                return outcome;
            }
        }
        HookOutcome::Proceed
    }

    /// Run the node's own hooks of `kind`, then its service's.
    async fn run_step(&self, kind: HookKind, id: NodeId) -> HookOutcome {
        let node = self.inner.tree.node(id, Side::Committed);
        let ctx = HookContext {
            kind,
            node: node.clone(),
            candidate: node.counterpart(),
            from: self.from.clone(),
            to: self.to.clone(),
            transition_id: self.id,
        };

        tracing::trace!(node = %node.full_name(), hook = %kind, "Running hooks");

        for hook in self.inner.tree.hooks(id, kind) {
            let outcome = settle(kind, node.full_name(), || hook(ctx.clone())).await;
            if kind.is_before() && outcome != HookOutcome::Proceed {
                tracing::debug!(node = %node.full_name(), hook = %kind, ?outcome, "Hook stopped transition");
                return outcome;
            }
        }

        // Leaving never constructs a service that does not exist yet.
        let service = if kind.is_arrival() {
            node.load_service().await
        } else {
            node.service()
        };
        if let Some(service) = service {
            let outcome = settle(kind, node.full_name(), || call_service(service, ctx.clone())).await;
            if kind.is_before() && outcome != HookOutcome::Proceed {
                tracing::debug!(node = %node.full_name(), hook = %kind, ?outcome, "Service stopped transition");
                return outcome;
            }
        }

        HookOutcome::Proceed
    }

    /// Undo the attempt: point the location somewhere else and leave the
    /// committed state untouched.
    async fn abort(&self, outcome: HookOutcome) -> Result<TransitionOutcome, RouterError> {
        let (target, result) = match outcome {
            HookOutcome::Redirect(reference) => (reference, TransitionOutcome::Redirected),
            _ => {
                let target = self
                    .from
                    .as_ref()
                    .unwrap_or(&self.inner.default_location)
                    .to_ref();
                (target, TransitionOutcome::Cancelled)
            }
        };

        let tree = &self.inner.tree;
        let committed = tree.source(Side::Committed).load();
        tree.source(Side::Candidate).publish((*committed).clone());

        tracing::info!(target = %target, outcome = result.as_str(), "Transition stopped, replacing location");

        match self.inner.location.replace(&target).await {
            Ok(()) => {
                metrics::record_revert(true);
                Ok(result)
            }
            Err(e) => {
                metrics::record_revert(false);
                tracing::warn!(target = %target, error = %e, "Location replace failed");
                Err(RouterError::Location(e))
            }
        }
    }
}

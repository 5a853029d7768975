//! The router: intake queue, processing loop and consumer API.
//!
//! # Responsibilities
//! - Serialize every location change through one FIFO queue
//! - Record the most recent intake so running transitions can notice they
//!   are stale
//! - Build refs from node names and params
//! - Hand out match nodes and snapshots to consumers
//!
//! # Design Decisions
//! - One processing task per router; transitions never overlap
//! - Locations from the collaborator are forwarded by a separate task, so
//!   intake keeps flowing while hooks run
//! - The staleness check drains already delivered locations first, so a
//!   navigation applied inside a hook is seen before the batch settles
//! - Pending navigations are answered with `Stopped` when the loop exits
//! - Navigation from inside hooks must not wait for its own transition;
//!   use `push`/`replace` or return a redirect there

use std::collections::BTreeMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use arc_swap::ArcSwapOption;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::{validate_config, RouterConfig};
use crate::error::RouterError;
use crate::lifecycle::transition::{run_transition, LocationChange, TransitionOutcome};
use crate::location::{Location, LocationSource};
use crate::routing::address::{decode_location, encode_ref, encode_segment};
use crate::routing::matcher::match_request;
use crate::routing::source::{Params, RouteSource};
use crate::routing::tree::{MatchNode, RouteTree, Side};
use crate::schema::{MatchPattern, SchemaTree};

const CHANGE_CHANNEL_CAPACITY: usize = 64;

type Reply = oneshot::Sender<Result<TransitionOutcome, RouterError>>;

struct Ticket {
    seq: u64,
    location: Location,
    reply: Option<Reply>,
}

struct Waiter {
    id: u64,
    location: Location,
    reply: Reply,
}

#[derive(Default)]
struct IntakeState {
    next_seq: u64,
    next_waiter: u64,
    waiters: Vec<Waiter>,
}

pub(crate) struct RouterInner {
    pub(crate) tree: Arc<RouteTree>,
    pub(crate) location: Arc<dyn LocationSource>,
    pub(crate) prefix: String,
    pub(crate) default_location: Location,
    pub(crate) committed_location: ArcSwapOption<Location>,
    /// Sequence number of the most recent intake.
    pub(crate) latest: AtomicU64,
    pub(crate) changes: broadcast::Sender<LocationChange>,
    intake: Mutex<IntakeState>,
    /// Collaborator subscription while `run` is active.
    events: Mutex<Option<mpsc::UnboundedReceiver<Location>>>,
    queue_tx: mpsc::UnboundedSender<Ticket>,
    queue_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Ticket>>,
}

impl RouterInner {
    fn intake_state(&self) -> MutexGuard<'_, IntakeState> {
        self.intake.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a location. Sequence assignment and queue order agree.
    fn enqueue(&self, location: Location, reply: Option<Reply>) {
        let mut state = self.intake_state();
        state.next_seq += 1;
        let seq = state.next_seq;
        self.latest.store(seq, std::sync::atomic::Ordering::SeqCst);

        tracing::trace!(seq, location = %location, "Location queued");
        if self.queue_tx.send(Ticket { seq, location, reply }).is_err() {
            tracing::warn!(seq, "Intake queue closed, dropping location");
        }
    }

    fn events(&self) -> MutexGuard<'_, Option<mpsc::UnboundedReceiver<Location>>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forward delivered locations into the queue. Ready once the
    /// subscription is closed or detached.
    fn poll_events(&self, cx: &mut Context<'_>) -> Poll<()> {
        let mut events = self.events();
        let Some(rx) = events.as_mut() else {
            return Poll::Ready(());
        };
        loop {
            match rx.poll_recv(cx) {
                Poll::Ready(Some(location)) => self.enqueue(location, None),
                Poll::Ready(None) => return Poll::Ready(()),
                Poll::Pending => return Poll::Pending,
            }
        }
    }

    /// Queue every location the collaborator already delivered.
    pub(crate) fn absorb_events(&self) {
        let mut events = self.events();
        if let Some(rx) = events.as_mut() {
            while let Ok(location) = rx.try_recv() {
                self.enqueue(location, None);
            }
        }
    }

    fn add_waiter(&self, location: Location) -> (u64, oneshot::Receiver<Result<TransitionOutcome, RouterError>>) {
        let (reply, rx) = oneshot::channel();
        let mut state = self.intake_state();
        state.next_waiter += 1;
        let id = state.next_waiter;
        state.waiters.push(Waiter { id, location, reply });
        (id, rx)
    }

    fn remove_waiter(&self, id: u64) {
        self.intake_state().waiters.retain(|w| w.id != id);
    }

    fn fail_waiters(&self) {
        let waiters = std::mem::take(&mut self.intake_state().waiters);
        for waiter in waiters {
            let _ = waiter.reply.send(Err(RouterError::Stopped));
        }
    }

    fn take_waiter(&self, location: &Location) -> Option<Reply> {
        let mut state = self.intake_state();
        let position = state.waiters.iter().position(|w| w.location.same_as(location))?;
        Some(state.waiters.remove(position).reply)
    }

    async fn process(&self, ticket: Ticket) {
        let result = run_transition(self, ticket.seq, ticket.location.clone()).await;
        if let Err(e) = &result {
            tracing::error!(location = %ticket.location, error = %e, "Transition failed");
        }

        let reply = ticket.reply.or_else(|| self.take_waiter(&ticket.location));
        if let Some(reply) = reply {
            // The caller may have stopped waiting.
            let _ = reply.send(result);
        }
    }
}

/// Detaches intake when `run` exits, normally or by unwinding.
struct StopGuard<'a> {
    inner: &'a RouterInner,
    queue: tokio::sync::MutexGuard<'a, mpsc::UnboundedReceiver<Ticket>>,
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        *self.inner.events() = None;
        while let Ok(ticket) = self.queue.try_recv() {
            if let Some(reply) = ticket.reply {
                let _ = reply.send(Err(RouterError::Stopped));
            }
        }
        self.inner.fail_waiters();
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Hierarchical router driven by a [`LocationSource`].
///
/// Cheap to clone; clones share one state.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    /// Validate `config`, compile its routes and attach `location`.
    pub fn new(config: &RouterConfig, location: Arc<dyn LocationSource>) -> Result<Self, RouterError> {
        validate_config(config).map_err(RouterError::Config)?;
        let schema = SchemaTree::build(&config.routes, &config.primary_group)?;
        let default_location =
            Location::parse(&format!("{}{}", config.prefix, config.default_location))?;

        let tree = RouteTree::new(Arc::new(schema));
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        tracing::info!(
            nodes = tree.schema().len(),
            groups = tree.schema().groups().len(),
            prefix = %config.prefix,
            "Router created"
        );

        Ok(Self {
            inner: Arc::new(RouterInner {
                tree,
                location,
                prefix: config.prefix.clone(),
                default_location,
                committed_location: ArcSwapOption::empty(),
                latest: AtomicU64::new(0),
                changes,
                intake: Mutex::new(IntakeState::default()),
                events: Mutex::new(None),
                queue_tx,
                queue_rx: tokio::sync::Mutex::new(queue_rx),
            }),
        })
    }

    /// Process locations until `shutdown` fires.
    ///
    /// Starts with the collaborator's current location. Only one `run` is
    /// active at a time; a second call waits for the first to return.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut guard = StopGuard {
            inner: &*self.inner,
            queue: self.inner.queue_rx.lock().await,
        };

        *self.inner.events() = Some(self.inner.location.subscribe());
        self.inner.enqueue(self.inner.location.current(), None);

        let inner = Arc::clone(&self.inner);
        let _forwarder = AbortOnDrop(tokio::spawn(async move {
            futures_util::future::poll_fn(|cx| inner.poll_events(cx)).await;
        }));

        tracing::info!("Router started");

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping router");
                    break;
                }
                ticket = guard.queue.recv() => {
                    match ticket {
                        Some(ticket) => self.inner.process(ticket).await,
                        None => break,
                    }
                }
            }
        }

        tracing::info!("Router stopped");
    }

    /// Queue `location` directly, bypassing the collaborator, and wait for
    /// its outcome. Fails with [`RouterError::Stopped`] if the router stops
    /// before reaching it.
    pub async fn submit(&self, location: Location) -> Result<TransitionOutcome, RouterError> {
        let (reply, rx) = oneshot::channel();
        self.inner.enqueue(location, Some(reply));
        rx.await.map_err(|_| RouterError::Stopped)?
    }

    /// Ask the collaborator to push `reference`. Does not wait for the
    /// resulting transition, so it is safe to call from hooks.
    pub async fn push(&self, reference: &str) -> Result<(), RouterError> {
        Ok(self.inner.location.push(reference).await?)
    }

    /// Ask the collaborator to replace the current entry with `reference`.
    pub async fn replace(&self, reference: &str) -> Result<(), RouterError> {
        Ok(self.inner.location.replace(reference).await?)
    }

    /// Push `reference` and wait until the router settled it.
    ///
    /// A failed revert after a cancelled transition is returned here.
    /// Never call this from a hook: the transition it waits for is queued
    /// behind the one running the hook.
    pub async fn push_settled(&self, reference: &str) -> Result<TransitionOutcome, RouterError> {
        self.navigate_settled(reference, false).await
    }

    /// Replace with `reference` and wait until the router settled it.
    pub async fn replace_settled(&self, reference: &str) -> Result<TransitionOutcome, RouterError> {
        self.navigate_settled(reference, true).await
    }

    async fn navigate_settled(
        &self,
        reference: &str,
        replace: bool,
    ) -> Result<TransitionOutcome, RouterError> {
        let location = Location::parse(reference)?;
        let (id, rx) = self.inner.add_waiter(location);

        let applied = if replace {
            self.inner.location.replace(reference).await
        } else {
            self.inner.location.push(reference).await
        };
        if let Err(e) = applied {
            self.inner.remove_waiter(id);
            return Err(e.into());
        }

        rx.await.map_err(|_| RouterError::Stopped)?
    }

    /// Build the ref that activates `target`.
    ///
    /// Capture segments take their value from `params` by node name and
    /// recognized query keys are copied when present. Paths of other active
    /// groups are preserved.
    pub fn build_ref(&self, target: &str, params: &Params) -> Result<String, RouterError> {
        let schema = self.inner.tree.schema();
        let id = schema
            .find(target)
            .ok_or_else(|| RouterError::UnknownNode(target.to_string()))?;

        let mut path = String::new();
        let mut query = BTreeMap::new();
        for step in schema.group_ancestry(id) {
            let node = schema.node(step);
            path.push('/');
            match node.pattern() {
                MatchPattern::Literal(text) => path.push_str(text),
                MatchPattern::Capture { regex, .. } => {
                    let value = params.get(node.name()).ok_or_else(|| RouterError::MissingParam {
                        node: target.to_string(),
                        param: node.name().to_string(),
                    })?;
                    let encoded = encode_segment(value);
                    let fits = regex
                        .find(&encoded)
                        .is_some_and(|m| m.end() == encoded.len());
                    if !fits {
                        return Err(RouterError::InvalidParam {
                            node: target.to_string(),
                            param: node.name().to_string(),
                            value: value.clone(),
                        });
                    }
                    path.push_str(&encoded);
                }
            }
            for key in node.query_keys() {
                if let Some(value) = params.get(key) {
                    query.insert(key.clone(), value.clone());
                }
            }
        }

        let committed = self.committed();
        let primary = schema.primary_group();
        let group = schema.node(id).group();

        let mut group_paths: BTreeMap<String, String> = committed
            .paths()
            .iter()
            .filter(|(g, _)| g.as_str() != primary)
            .map(|(g, p)| (g.clone(), p.clone()))
            .collect();

        let primary_path = if group == primary {
            path
        } else {
            group_paths.insert(group.to_string(), path);
            committed.path(primary).unwrap_or("/").to_string()
        };

        Ok(encode_ref(&self.inner.prefix, &primary_path, &query, &group_paths))
    }

    /// Match `reference` without running hooks or publishing anything.
    pub fn resolve(&self, reference: &str) -> Result<RouteSource, RouterError> {
        let location = Location::parse(reference)?;
        let schema = self.inner.tree.schema();
        let request = decode_location(&location, &self.inner.prefix, schema.primary_group());
        let (paths, chains) = match_request(schema, &request);
        Ok(RouteSource::new(paths, chains, request.query))
    }

    pub fn tree(&self) -> &Arc<RouteTree> {
        &self.inner.tree
    }

    /// Committed view of a node.
    pub fn node(&self, full_name: &str) -> Result<MatchNode, RouterError> {
        self.inner
            .tree
            .node_by_name(full_name, Side::Committed)
            .ok_or_else(|| RouterError::UnknownNode(full_name.to_string()))
    }

    /// Candidate view of a node.
    pub fn candidate(&self, full_name: &str) -> Result<MatchNode, RouterError> {
        self.inner
            .tree
            .node_by_name(full_name, Side::Candidate)
            .ok_or_else(|| RouterError::UnknownNode(full_name.to_string()))
    }

    pub fn committed(&self) -> Arc<RouteSource> {
        self.inner.tree.source(Side::Committed).load()
    }

    pub fn candidate_source(&self) -> Arc<RouteSource> {
        self.inner.tree.source(Side::Candidate).load()
    }

    /// Location of the last commit.
    pub fn committed_location(&self) -> Option<Location> {
        self.inner
            .committed_location
            .load_full()
            .map(|location| (*location).clone())
    }

    /// Watch the committed snapshot version; changes once per commit.
    pub fn watch_version(&self) -> watch::Receiver<u64> {
        self.inner.tree.source(Side::Committed).watch()
    }

    /// Receive `(previous, next)` after every commit.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<LocationChange> {
        self.inner.changes.subscribe()
    }
}

//! Match nodes: the live view of the schema.
//!
//! Every schema node is instantiated twice, once reading the committed
//! source and once reading the candidate source. Both sets come out of the
//! same recursive constructor; the side only decides which source a node
//! reads from. Hooks and the service slot belong to the logical node and are
//! shared by both sides.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::error::RouterError;
use crate::lifecycle::hooks::{hook, Hook, HookKind, HookRegistry, HookResult, HookContext};
use crate::lifecycle::service::{RouteService, ServiceFactory, ServiceSlot};
use crate::routing::source::{MatchEntry, Params, RouteSource, SourceCell};
use crate::schema::{NodeId, SchemaNode, SchemaTree};

/// Which source a match node reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// State observers see; changes only on commit.
    Committed,
    /// State of the transition in flight.
    Candidate,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Committed => Side::Candidate,
            Side::Candidate => Side::Committed,
        }
    }
}

struct NodeRecord {
    id: NodeId,
    /// Params derived for the source version they were computed from.
    params: Mutex<Option<(u64, Arc<Params>)>>,
}

struct NodeSet {
    source: Arc<SourceCell>,
    records: Vec<NodeRecord>,
}

impl NodeSet {
    fn new(schema: &SchemaTree, source: Arc<SourceCell>) -> Self {
        let mut records = Vec::with_capacity(schema.len());
        for &root in schema.roots() {
            instantiate(schema, root, &mut records);
        }
        Self { source, records }
    }
}

/// Create the record of `id` and, recursively, of its subtree.
///
/// Records end up in pre-order, so a record's index equals its node id.
fn instantiate(schema: &SchemaTree, id: NodeId, records: &mut Vec<NodeRecord>) {
    debug_assert_eq!(records.len(), id.index());
    records.push(NodeRecord {
        id,
        params: Mutex::new(None),
    });
    for &child in schema.node(id).children() {
        instantiate(schema, child, records);
    }
}

#[derive(Default)]
struct NodeBinding {
    hooks: HookRegistry,
    service: ServiceSlot,
}

/// Both node sets of a router plus the per-node bindings they share.
pub struct RouteTree {
    schema: Arc<SchemaTree>,
    committed: NodeSet,
    candidate: NodeSet,
    bindings: Vec<NodeBinding>,
}

impl RouteTree {
    pub fn new(schema: Arc<SchemaTree>) -> Arc<Self> {
        let committed = NodeSet::new(&schema, Arc::new(SourceCell::new()));
        let candidate = NodeSet::new(&schema, Arc::new(SourceCell::new()));
        let bindings = (0..schema.len()).map(|_| NodeBinding::default()).collect();
        Arc::new(Self {
            schema,
            committed,
            candidate,
            bindings,
        })
    }

    pub fn schema(&self) -> &SchemaTree {
        &self.schema
    }

    fn set(&self, side: Side) -> &NodeSet {
        match side {
            Side::Committed => &self.committed,
            Side::Candidate => &self.candidate,
        }
    }

    pub fn source(&self, side: Side) -> &Arc<SourceCell> {
        &self.set(side).source
    }

    pub fn node(self: &Arc<Self>, id: NodeId, side: Side) -> MatchNode {
        MatchNode {
            tree: Arc::clone(self),
            id,
            side,
        }
    }

    /// Look a node up by its dotted name.
    pub fn node_by_name(self: &Arc<Self>, full_name: &str, side: Side) -> Option<MatchNode> {
        self.schema.find(full_name).map(|id| self.node(id, side))
    }

    /// Every node of one side, in pre-order.
    pub fn nodes(self: &Arc<Self>, side: Side) -> Vec<MatchNode> {
        self.set(side)
            .records
            .iter()
            .map(|record| self.node(record.id, side))
            .collect()
    }

    pub(crate) fn hooks(&self, id: NodeId, kind: HookKind) -> Vec<Hook> {
        self.bindings[id.index()].hooks.snapshot(kind)
    }
}

/// Params of `id` as seen by `source`: the decoded captures of every chain
/// node from the group root down to `id`, keyed by node name, plus the values
/// of the query keys those nodes recognize.
fn derive_params(schema: &SchemaTree, source: &RouteSource, id: NodeId) -> Params {
    let node = schema.node(id);
    let chain = source.chain(node.group());
    let Some(position) = chain.iter().position(|entry| entry.node == id) else {
        return Params::new();
    };

    let mut params = Params::new();
    for entry in &chain[..=position] {
        let step = schema.node(entry.node);
        if let Some(value) = &entry.param {
            params.insert(step.name().to_string(), value.clone());
        }
        for key in step.query_keys() {
            if let Some(value) = source.query().get(key) {
                params.insert(key.clone(), value.clone());
            }
        }
    }
    params
}

/// Handle to one node on one side.
///
/// Cheap to clone; all state lives in the shared [`RouteTree`].
#[derive(Clone)]
pub struct MatchNode {
    tree: Arc<RouteTree>,
    id: NodeId,
    side: Side,
}

impl MatchNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn schema(&self) -> &SchemaNode {
        self.tree.schema.node(self.id)
    }

    pub fn name(&self) -> &str {
        self.schema().name()
    }

    pub fn full_name(&self) -> &str {
        self.schema().full_name()
    }

    pub fn group(&self) -> &str {
        self.schema().group()
    }

    pub fn parent(&self) -> Option<MatchNode> {
        self.schema().parent().map(|p| self.tree.node(p, self.side))
    }

    pub fn children(&self) -> Vec<MatchNode> {
        self.schema()
            .children()
            .iter()
            .map(|&c| self.tree.node(c, self.side))
            .collect()
    }

    /// The same logical node on the other side.
    pub fn counterpart(&self) -> MatchNode {
        self.tree.node(self.id, self.side.other())
    }

    fn source(&self) -> Arc<RouteSource> {
        self.tree.source(self.side).load()
    }

    /// This node's entry in the current snapshot, if it is part of a chain.
    pub fn entry(&self) -> Option<MatchEntry> {
        self.source().entry(self.group(), self.id).cloned()
    }

    pub fn is_matched(&self) -> bool {
        self.entry().is_some()
    }

    pub fn is_exact(&self) -> bool {
        self.entry().is_some_and(|entry| entry.exact)
    }

    /// Raw path segment the node consumed.
    pub fn segment(&self) -> Option<String> {
        self.entry().map(|entry| entry.segment)
    }

    /// Derived parameters. Empty while the node is not matched.
    ///
    /// Recomputed at most once per source version.
    pub fn params(&self) -> Arc<Params> {
        let source = self.source();
        let record = &self.tree.set(self.side).records[self.id.index()];
        let mut memo = record.params.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((version, params)) = memo.as_ref() {
            if *version == source.version() {
                return Arc::clone(params);
            }
        }
        let params = Arc::new(derive_params(&self.tree.schema, &source, self.id));
        *memo = Some((source.version(), Arc::clone(&params)));
        params
    }

    pub fn param(&self, key: &str) -> Option<String> {
        self.params().get(key).cloned()
    }

    /// Value of a declared extension key.
    ///
    /// While the node is matched and its service is already constructed, the
    /// service's value wins over the schema default. Undeclared keys yield
    /// `None`.
    pub fn extension(&self, key: &str) -> Option<Value> {
        let default = self.schema().extension_defaults().get(key)?;
        if self.is_matched() {
            if let Some(value) = self.service().and_then(|service| service.extension(key)) {
                return Some(value);
            }
        }
        Some(default.clone())
    }

    /// Like [`MatchNode::extension`], constructing the service first when the
    /// node is matched.
    pub async fn resolve_extension(&self, key: &str) -> Option<Value> {
        let default = self.schema().extension_defaults().get(key)?.clone();
        if self.is_matched() {
            if let Some(value) = self
                .load_service()
                .await
                .and_then(|service| service.extension(key))
            {
                return Some(value);
            }
        }
        Some(default)
    }

    /// Register a hook. Hooks should be registered before the router runs.
    pub fn on<F, Fut>(&self, kind: HookKind, f: F)
    where
        F: Fn(HookContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.on_hook(kind, hook(f));
    }

    pub fn on_hook(&self, kind: HookKind, hook: Hook) {
        tracing::trace!(node = %self.full_name(), hook = %kind, "Hook registered");
        self.tree.bindings[self.id.index()].hooks.register(kind, hook);
    }

    pub fn hook_count(&self, kind: HookKind) -> usize {
        self.tree.bindings[self.id.index()].hooks.count(kind)
    }

    /// Bind the node's service factory. A node takes at most one.
    pub fn bind_service(&self, factory: ServiceFactory) -> Result<(), RouterError> {
        if self.tree.bindings[self.id.index()].service.register(factory) {
            Ok(())
        } else {
            Err(RouterError::DuplicateService(self.full_name().to_string()))
        }
    }

    /// The service, if it was already constructed.
    pub fn service(&self) -> Option<Arc<dyn RouteService>> {
        self.tree.bindings[self.id.index()].service.get()
    }

    /// The service, constructing it on first call. The factory sees the
    /// committed view of the node.
    pub async fn load_service(&self) -> Option<Arc<dyn RouteService>> {
        let committed = self.tree.node(self.id, Side::Committed);
        self.tree.bindings[self.id.index()]
            .service
            .load(committed)
            .await
    }
}

impl fmt::Debug for MatchNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatchNode")
            .field("name", &self.full_name())
            .field("side", &self.side)
            .field("matched", &self.is_matched())
            .field("exact", &self.is_exact())
            .finish()
    }
}

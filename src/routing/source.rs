//! Route sources: the data match nodes read from.
//!
//! A router keeps two sources. The committed one is the authoritative state
//! consumers observe; the candidate one reflects the transition in flight.
//! Both are published as whole immutable snapshots, so a reader never sees
//! half of a commit.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;
use tokio::sync::watch;

use crate::schema::NodeId;

/// Parameters derived for a node: captured segments and recognized query keys.
pub type Params = BTreeMap<String, String>;

/// Outcome of matching one path segment against one schema node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchEntry {
    pub node: NodeId,
    /// Whether the path was fully consumed at this node.
    pub exact: bool,
    /// Raw segment text as it appeared in the path.
    pub segment: String,
    /// Decoded captured value, for capture patterns.
    pub param: Option<String>,
}

/// One immutable snapshot of routing state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RouteSource {
    version: u64,
    paths: BTreeMap<String, String>,
    chains: BTreeMap<String, Vec<MatchEntry>>,
    query: BTreeMap<String, String>,
}

impl RouteSource {
    pub fn new(
        paths: BTreeMap<String, String>,
        chains: BTreeMap<String, Vec<MatchEntry>>,
        query: BTreeMap<String, String>,
    ) -> Self {
        Self {
            version: 0,
            paths,
            chains,
            query,
        }
    }

    /// Publish counter; bumps on every publish into a [`SourceCell`].
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn path(&self, group: &str) -> Option<&str> {
        self.paths.get(group).map(String::as_str)
    }

    pub fn paths(&self) -> &BTreeMap<String, String> {
        &self.paths
    }

    /// Matched chain of a group, root first. Empty when nothing matched.
    pub fn chain(&self, group: &str) -> &[MatchEntry] {
        self.chains.get(group).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn chains(&self) -> &BTreeMap<String, Vec<MatchEntry>> {
        &self.chains
    }

    /// Entry of `node` within `group`, if the node is part of the chain.
    pub fn entry(&self, group: &str, node: NodeId) -> Option<&MatchEntry> {
        self.chain(group).iter().find(|entry| entry.node == node)
    }

    pub fn query(&self) -> &BTreeMap<String, String> {
        &self.query
    }

    /// Groups that currently have a path or a chain.
    pub fn groups(&self) -> impl Iterator<Item = &String> {
        let mut groups: Vec<&String> = self.paths.keys().chain(self.chains.keys()).collect();
        groups.sort();
        groups.dedup();
        groups.into_iter()
    }

    /// Copy one group's path and chain from `other`, removing it when
    /// `other` has none.
    pub(crate) fn adopt_group(&mut self, other: &RouteSource, group: &str) {
        match other.paths.get(group) {
            Some(path) => {
                self.paths.insert(group.to_string(), path.clone());
            }
            None => {
                self.paths.remove(group);
            }
        }
        match other.chains.get(group) {
            Some(chain) => {
                self.chains.insert(group.to_string(), chain.clone());
            }
            None => {
                self.chains.remove(group);
            }
        }
    }

    pub(crate) fn set_query(&mut self, query: BTreeMap<String, String>) {
        self.query = query;
    }
}

/// Atomically swappable holder of a [`RouteSource`].
///
/// Reads are lock-free snapshots; publishing replaces the whole snapshot and
/// notifies version watchers.
#[derive(Debug)]
pub struct SourceCell {
    current: ArcSwap<RouteSource>,
    version_tx: watch::Sender<u64>,
}

impl SourceCell {
    pub fn new() -> Self {
        let (version_tx, _) = watch::channel(0);
        Self {
            current: ArcSwap::from_pointee(RouteSource::default()),
            version_tx,
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<RouteSource> {
        self.current.load_full()
    }

    /// Replace the snapshot. Returns the version assigned to it.
    ///
    /// Only the router's processing task publishes, so the read-increment
    /// below never races.
    pub(crate) fn publish(&self, mut next: RouteSource) -> u64 {
        let version = self.current.load().version + 1;
        next.version = version;
        self.current.store(Arc::new(next));
        self.version_tx.send_replace(version);
        version
    }

    /// Watch the version counter; changes once per publish.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.version_tx.subscribe()
    }
}

impl Default for SourceCell {
    fn default() -> Self {
        Self::new()
    }
}

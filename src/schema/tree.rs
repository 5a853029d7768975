//! Schema tree construction.

use std::collections::BTreeSet;

use indexmap::IndexMap;

use crate::config::{PatternConfig, RouteConfig};
use crate::schema::node::{MatchPattern, NodeId, ParallelWhitelist, SchemaNode};
use crate::schema::SchemaError;

/// Immutable route schema, stored as an arena in pre-order.
#[derive(Debug, Clone)]
pub struct SchemaTree {
    nodes: Vec<SchemaNode>,
    roots: Vec<NodeId>,
    groups: BTreeSet<String>,
    primary_group: String,
}

impl SchemaTree {
    /// Compile the route map of a configuration.
    ///
    /// Top-level nodes without an explicit group join `primary_group`.
    pub fn build(
        routes: &IndexMap<String, RouteConfig>,
        primary_group: &str,
    ) -> Result<Self, SchemaError> {
        if primary_group.is_empty() {
            return Err(SchemaError::EmptyGroup {
                node: "<router>".to_string(),
            });
        }

        let mut tree = Self {
            nodes: Vec::new(),
            roots: Vec::new(),
            groups: BTreeSet::from([primary_group.to_string()]),
            primary_group: primary_group.to_string(),
        };

        for (name, route) in routes {
            let id = tree.build_node(name, route, None, primary_group)?;
            tree.roots.push(id);
        }

        tracing::debug!(
            nodes = tree.nodes.len(),
            groups = tree.groups.len(),
            "Schema tree compiled"
        );
        Ok(tree)
    }

    fn build_node(
        &mut self,
        name: &str,
        route: &RouteConfig,
        parent: Option<NodeId>,
        inherited_group: &str,
    ) -> Result<NodeId, SchemaError> {
        let (full_name, depth) = match parent {
            Some(p) => {
                let parent = &self.nodes[p.0];
                (format!("{}.{}", parent.full_name, name), parent.depth + 1)
            }
            None => (name.to_string(), 0),
        };

        let group = route.group.as_deref().unwrap_or(inherited_group).to_string();
        if group.is_empty() {
            return Err(SchemaError::EmptyGroup { node: full_name });
        }

        let pattern = match &route.pattern {
            Some(config) => MatchPattern::compile(&full_name, config)?,
            None => MatchPattern::compile(&full_name, &PatternConfig::Literal(name.to_string()))?,
        };

        let parallel = route.parallel.as_ref().map(|p| ParallelWhitelist {
            groups: p.groups.iter().cloned().collect(),
            nodes: p.nodes.iter().cloned().collect(),
        });

        let id = NodeId(self.nodes.len());
        self.groups.insert(group.clone());
        self.nodes.push(SchemaNode {
            id,
            name: name.to_string(),
            full_name,
            parent,
            children: Vec::new(),
            depth,
            pattern,
            query: route.query.iter().cloned().collect(),
            exact: route.exact,
            group: group.clone(),
            extension: route.extension.clone(),
            parallel,
        });

        for (child_name, child) in &route.children {
            let child_id = self.build_node(child_name, child, Some(id), &group)?;
            self.nodes[id.0].children.push(child_id);
        }

        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> &SchemaNode {
        &self.nodes[id.0]
    }

    pub fn nodes(&self) -> &[SchemaNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level nodes in declaration order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Every group name used by the tree, primary group included.
    pub fn groups(&self) -> &BTreeSet<String> {
        &self.groups
    }

    pub fn primary_group(&self) -> &str {
        &self.primary_group
    }

    /// Find a node by its dotted name.
    pub fn find(&self, full_name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|node| node.full_name == full_name)
            .map(|node| node.id)
    }

    /// Nodes where matching for `group` starts: members of the group whose
    /// parent is absent or belongs to another group.
    pub fn group_roots<'a>(&'a self, group: &'a str) -> impl Iterator<Item = NodeId> + 'a {
        self.nodes
            .iter()
            .filter(move |node| {
                node.group == group
                    && node
                        .parent
                        .map_or(true, |p| self.nodes[p.0].group != group)
            })
            .map(|node| node.id)
    }

    /// Children of `id` that stay inside its group, in declaration order.
    pub fn children_in_group(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let group = &self.nodes[id.0].group;
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(move |child| &self.nodes[child.0].group == group)
    }

    /// Ancestors of `id` inside its group, from the group root down to `id`.
    pub fn group_ancestry(&self, id: NodeId) -> Vec<NodeId> {
        let group = &self.nodes[id.0].group;
        let mut chain = vec![id];
        let mut current = self.nodes[id.0].parent;
        while let Some(parent) = current {
            if &self.nodes[parent.0].group != group {
                break;
            }
            chain.push(parent);
            current = self.nodes[parent.0].parent;
        }
        chain.reverse();
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;

    fn sample() -> SchemaTree {
        let config = RouterConfig::new()
            .route("default", RouteConfig::new().literal(""))
            .route(
                "account",
                RouteConfig::new()
                    .child("id", RouteConfig::new().capture("[^/]+"))
                    .child(
                        "panel",
                        RouteConfig::new()
                            .group("side")
                            .child("detail", RouteConfig::new()),
                    ),
            );
        SchemaTree::build(&config.routes, &config.primary_group).unwrap()
    }

    #[test]
    fn test_pre_order_ids() {
        let tree = sample();
        let names: Vec<_> = tree.nodes().iter().map(|n| n.full_name().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "default",
                "account",
                "account.id",
                "account.panel",
                "account.panel.detail"
            ]
        );
        assert_eq!(tree.roots().len(), 2);
    }

    #[test]
    fn test_group_inheritance() {
        let tree = sample();
        let detail = tree.find("account.panel.detail").unwrap();
        assert_eq!(tree.node(detail).group(), "side");
        assert_eq!(tree.node(tree.find("account.id").unwrap()).group(), "main");
        assert_eq!(tree.groups().len(), 2);
    }

    #[test]
    fn test_group_roots_and_ancestry() {
        let tree = sample();
        let side_roots: Vec<_> = tree.group_roots("side").collect();
        assert_eq!(side_roots, vec![tree.find("account.panel").unwrap()]);

        let account = tree.find("account").unwrap();
        let in_group: Vec<_> = tree.children_in_group(account).collect();
        assert_eq!(in_group, vec![tree.find("account.id").unwrap()]);

        let detail = tree.find("account.panel.detail").unwrap();
        let ancestry = tree.group_ancestry(detail);
        assert_eq!(ancestry, vec![tree.find("account.panel").unwrap(), detail]);
    }

    #[test]
    fn test_default_literal_is_name() {
        let tree = sample();
        let account = tree.node(tree.find("account").unwrap());
        assert!(matches!(account.pattern(), MatchPattern::Literal(text) if text == "account"));
    }

    #[test]
    fn test_schema_error_is_fatal() {
        let config = RouterConfig::new().route(
            "x",
            RouteConfig::new().child("y", RouteConfig::new().capture_with_flags("[0-9]+", "g")),
        );
        let err = SchemaTree::build(&config.routes, "main").unwrap_err();
        assert!(matches!(err, SchemaError::GlobalPattern { ref node, .. } if node == "x.y"));
    }
}

//! Route matching logic.
//!
//! # Responsibilities
//! - Match one node's pattern against the head of a remaining path
//! - Walk the schema tree depth-first to find the first complete chain
//! - Match every group's path independently, then apply the parallel
//!   whitelist of the primary leaf
//!
//! # Design Decisions
//! - A segment only matches on a boundary: the consumed text must be
//!   followed by nothing or by `/`
//! - Nodes with children only match exactly when they opt in
//! - Declaration order decides between competing siblings; ambiguity is
//!   never reported
//! - Backtracking: a partial match whose subtree fails gives way to the
//!   next sibling

use std::collections::BTreeMap;

use crate::routing::address::{decode_component, RouteRequest};
use crate::routing::source::MatchEntry;
use crate::schema::{MatchPattern, NodeId, SchemaNode, SchemaTree};

/// Result of matching a single node against a remaining path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMatch<'a> {
    pub matched: bool,
    pub exactly_matched: bool,
    /// Raw consumed text (without the leading `/`).
    pub segment: &'a str,
    /// Decoded captured value for capture patterns.
    pub param: Option<String>,
    /// Unconsumed remainder, `""` or starting with `/`.
    pub rest: &'a str,
}

impl<'a> SegmentMatch<'a> {
    fn miss(rest: &'a str) -> Self {
        Self {
            matched: false,
            exactly_matched: false,
            segment: "",
            param: None,
            rest,
        }
    }
}

fn on_boundary(text: &str, consumed: usize) -> bool {
    text[consumed..].is_empty() || text[consumed..].starts_with('/')
}

/// Match `node` against `remaining` (`""` or a string starting with `/`).
pub fn match_node<'a>(node: &SchemaNode, remaining: &'a str) -> SegmentMatch<'a> {
    let Some(text) = remaining.strip_prefix('/') else {
        return SegmentMatch::miss(remaining);
    };

    let (segment, param) = match node.pattern() {
        MatchPattern::Literal(literal) => {
            if !text.starts_with(literal.as_str()) || !on_boundary(text, literal.len()) {
                return SegmentMatch::miss(remaining);
            }
            (&text[..literal.len()], None)
        }
        MatchPattern::Capture { regex, .. } => {
            let Some(whole) = regex.find(text) else {
                return SegmentMatch::miss(remaining);
            };
            if !on_boundary(text, whole.end()) {
                return SegmentMatch::miss(remaining);
            }
            (whole.as_str(), Some(decode_component(whole.as_str())))
        }
    };

    let rest = &text[segment.len()..];
    // A parent reached with nothing left is not an exact stop unless it opts
    // in; the tree walk still offers the empty remainder to its children.
    let exactly_matched = rest.is_empty() && (!node.has_children() || node.allows_exact());

    SegmentMatch {
        matched: true,
        exactly_matched,
        segment,
        param,
        rest,
    }
}

/// Find the first complete chain for `path` in `group`, root first.
pub fn match_tree(tree: &SchemaTree, group: &str, path: &str) -> Option<Vec<MatchEntry>> {
    let roots: Vec<NodeId> = tree.group_roots(group).collect();
    match_siblings(tree, &roots, path)
}

fn match_siblings(tree: &SchemaTree, candidates: &[NodeId], path: &str) -> Option<Vec<MatchEntry>> {
    for &id in candidates {
        let node = tree.node(id);
        let result = match_node(node, path);
        if !result.matched {
            continue;
        }

        let entry = MatchEntry {
            node: id,
            exact: result.exactly_matched,
            segment: result.segment.to_string(),
            param: result.param.clone(),
        };
        if result.exactly_matched {
            return Some(vec![entry]);
        }

        let children: Vec<NodeId> = tree.children_in_group(id).collect();
        if let Some(mut tail) = match_siblings(tree, &children, result.rest) {
            tail.insert(0, entry);
            return Some(tail);
        }
        if result.rest.is_empty() {
            // Path consumed at a parent: the chain stops here, not exactly.
            return Some(vec![entry]);
        }
        // Subtree failed; backtrack to the next sibling.
    }
    None
}

/// Match every `(path, group)` pair of a request and prune groups the
/// primary leaf does not allow next to it.
///
/// Groups whose path matched nothing are dropped; the primary group's path
/// is always kept.
pub fn match_request(
    tree: &SchemaTree,
    request: &RouteRequest,
) -> (BTreeMap<String, String>, BTreeMap<String, Vec<MatchEntry>>) {
    let primary = tree.primary_group();
    let mut chains = BTreeMap::new();
    for (group, path) in &request.paths {
        if let Some(chain) = match_tree(tree, group, path) {
            chains.insert(group.clone(), chain);
        } else {
            tracing::trace!(group = %group, path = %path, "No route matched");
        }
    }

    let whitelist = chains
        .get(primary)
        .and_then(|chain| chain.last())
        .and_then(|leaf| tree.node(leaf.node).parallel());

    if let Some(whitelist) = whitelist {
        chains.retain(|group, chain| {
            let keep = group == primary
                || whitelist.allows(
                    group,
                    chain.iter().map(|entry| tree.node(entry.node).full_name()),
                );
            if !keep {
                tracing::debug!(group = %group, "Parallel group not whitelisted, dropping");
            }
            keep
        });
    }

    let paths = request
        .paths
        .iter()
        .filter(|(group, _)| group.as_str() == primary || chains.contains_key(*group))
        .map(|(group, path)| (group.clone(), path.clone()))
        .collect();

    (paths, chains)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RouteConfig, RouterConfig};

    fn tree(config: RouterConfig) -> SchemaTree {
        SchemaTree::build(&config.routes, &config.primary_group).unwrap()
    }

    fn names(tree: &SchemaTree, chain: &[MatchEntry]) -> Vec<String> {
        chain
            .iter()
            .map(|e| tree.node(e.node).full_name().to_string())
            .collect()
    }

    #[test]
    fn test_literal_boundary_rule() {
        let schema = tree(RouterConfig::new().route("acc", RouteConfig::new()));
        let node = schema.node(schema.find("acc").unwrap());

        assert!(match_node(node, "/acc").exactly_matched);
        assert_eq!(match_node(node, "/acc/1").rest, "/1");
        assert!(!match_node(node, "/account").matched);
        assert!(!match_node(node, "").matched);
        assert!(!match_node(node, "acc").matched);
    }

    #[test]
    fn test_capture_boundary_rule() {
        let schema = tree(RouterConfig::new().route("id", RouteConfig::new().capture("[0-9]+")));
        let node = schema.node(schema.find("id").unwrap());

        let hit = match_node(node, "/42/edit");
        assert!(hit.matched);
        assert_eq!(hit.segment, "42");
        assert_eq!(hit.param.as_deref(), Some("42"));
        assert_eq!(hit.rest, "/edit");

        // "42abc" stops mid-segment.
        assert!(!match_node(node, "/42abc").matched);
    }

    #[test]
    fn test_capture_value_is_whole_segment() {
        let schema = tree(
            RouterConfig::new().route("user", RouteConfig::new().capture("@([^/]+)")),
        );
        let node = schema.node(schema.find("user").unwrap());

        let hit = match_node(node, "/@jane%20doe");
        assert_eq!(hit.segment, "@jane%20doe");
        // The group only constrains the match; the value keeps the `@`.
        assert_eq!(hit.param.as_deref(), Some("@jane doe"));
    }

    #[test]
    fn test_exactness_with_children() {
        let plain = tree(
            RouterConfig::new().route("x", RouteConfig::new().child("y", RouteConfig::new())),
        );
        let chain = match_tree(&plain, "main", "/x/y").unwrap();
        assert_eq!(names(&plain, &chain), vec!["x", "x.y"]);
        assert!(!chain[0].exact);
        assert!(chain[1].exact);

        // /x stops at x without being exact.
        let chain = match_tree(&plain, "main", "/x").unwrap();
        assert_eq!(names(&plain, &chain), vec!["x"]);
        assert!(!chain[0].exact);
        let x = plain.node(plain.find("x").unwrap());
        let hit = match_node(x, "/x");
        assert!(hit.matched && !hit.exactly_matched);

        let leaf = tree(RouterConfig::new().route("x", RouteConfig::new()));
        let chain = match_tree(&leaf, "main", "/x").unwrap();
        assert!(chain[0].exact);

        let opted = tree(
            RouterConfig::new().route(
                "x",
                RouteConfig::new().exact().child("y", RouteConfig::new()),
            ),
        );
        let chain = match_tree(&opted, "main", "/x").unwrap();
        assert_eq!(names(&opted, &chain), vec!["x"]);
        assert!(chain[0].exact);
    }

    #[test]
    fn test_index_child_consumes_trailing_slash() {
        let schema = tree(
            RouterConfig::new().route(
                "x",
                RouteConfig::new()
                    .child("index", RouteConfig::new().literal(""))
                    .child("y", RouteConfig::new()),
            ),
        );
        let chain = match_tree(&schema, "main", "/x/").unwrap();
        assert_eq!(names(&schema, &chain), vec!["x", "x.index"]);
        assert!(!chain[0].exact);
        assert!(chain[1].exact);
    }

    #[test]
    fn test_declaration_order_and_backtracking() {
        let schema = tree(
            RouterConfig::new()
                .route(
                    "first",
                    RouteConfig::new()
                        .literal("docs")
                        .child("only", RouteConfig::new().literal("intro")),
                )
                .route(
                    "second",
                    RouteConfig::new()
                        .literal("docs")
                        .child("page", RouteConfig::new().capture("[a-z]+")),
                ),
        );

        // Both subtrees could take "intro"; the first declared wins.
        let chain = match_tree(&schema, "main", "/docs/intro").unwrap();
        assert_eq!(names(&schema, &chain), vec!["first", "first.only"]);

        // "first" matches "docs" but its subtree fails; fall back to "second".
        let chain = match_tree(&schema, "main", "/docs/setup").unwrap();
        assert_eq!(names(&schema, &chain), vec!["second", "second.page"]);
    }

    #[test]
    fn test_match_request_applies_whitelist() {
        let schema = tree(
            RouterConfig::new()
                .route("inbox", RouteConfig::new().parallel_groups(["side"]))
                .route("settings", RouteConfig::new().parallel_nodes(["modal.help"]))
                .route("panel", RouteConfig::new().group("side"))
                .route(
                    "modal",
                    RouteConfig::new()
                        .group("modal")
                        .child("help", RouteConfig::new())
                        .child("about", RouteConfig::new()),
                ),
        );

        let request = RouteRequest {
            paths: BTreeMap::from([
                ("main".into(), "/inbox".into()),
                ("side".into(), "/panel".into()),
                ("modal".into(), "/modal/help".into()),
            ]),
            query: BTreeMap::new(),
        };
        let (paths, chains) = match_request(&schema, &request);
        assert!(chains.contains_key("side"));
        assert!(!chains.contains_key("modal"));
        assert!(!paths.contains_key("modal"));

        let request = RouteRequest {
            paths: BTreeMap::from([
                ("main".into(), "/settings".into()),
                ("side".into(), "/panel".into()),
                ("modal".into(), "/modal/help".into()),
            ]),
            query: BTreeMap::new(),
        };
        let (_, chains) = match_request(&schema, &request);
        assert!(!chains.contains_key("side"));
        assert!(chains.contains_key("modal"));
    }

    #[test]
    fn test_no_whitelist_allows_everything() {
        let schema = tree(
            RouterConfig::new()
                .route("home", RouteConfig::new())
                .route("panel", RouteConfig::new().group("side")),
        );
        let request = RouteRequest {
            paths: BTreeMap::from([
                ("main".into(), "/home".into()),
                ("side".into(), "/panel".into()),
                ("ghost".into(), "/nothing".into()),
            ]),
            query: BTreeMap::new(),
        };
        let (paths, chains) = match_request(&schema, &request);
        assert_eq!(chains.len(), 2);
        assert!(!paths.contains_key("ghost"));
    }
}

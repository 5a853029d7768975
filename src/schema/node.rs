//! Compiled schema nodes.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use serde_json::Value;

use crate::config::PatternConfig;
use crate::schema::SchemaError;

/// Index of a node inside its schema tree (pre-order, declaration order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How a node consumes one path segment.
#[derive(Debug, Clone)]
pub enum MatchPattern {
    /// Exact segment text.
    Literal(String),
    /// Regular expression anchored at the start of the remaining path.
    Capture { source: String, regex: Regex },
}

impl MatchPattern {
    /// Compile a pattern as written in a route file.
    ///
    /// `node` is only used for error messages.
    pub fn compile(node: &str, config: &PatternConfig) -> Result<Self, SchemaError> {
        match config {
            PatternConfig::Literal(text) => Ok(MatchPattern::Literal(text.clone())),
            PatternConfig::Capture { capture, flags } => Self::compile_capture(node, capture, flags),
        }
    }

    fn compile_capture(node: &str, source: &str, flags: &str) -> Result<Self, SchemaError> {
        let mut builder = RegexBuilder::new(&format!("^(?:{source})"));
        for flag in flags.chars() {
            match flag {
                'g' => {
                    return Err(SchemaError::GlobalPattern {
                        node: node.to_string(),
                        pattern: source.to_string(),
                    })
                }
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                'x' => {
                    builder.ignore_whitespace(true);
                }
                // Anchoring is implied, unicode is the default.
                'y' | 'u' => {}
                other => {
                    return Err(SchemaError::UnknownFlag {
                        node: node.to_string(),
                        flag: other,
                    })
                }
            }
        }

        let regex = builder.build().map_err(|e| SchemaError::InvalidPattern {
            node: node.to_string(),
            pattern: source.to_string(),
            reason: e.to_string(),
        })?;

        // captures_len counts the implicit whole-match group.
        if regex.captures_len() > 2 {
            return Err(SchemaError::MultipleCaptures {
                node: node.to_string(),
                pattern: source.to_string(),
            });
        }

        Ok(MatchPattern::Capture {
            source: source.to_string(),
            regex,
        })
    }

    pub fn is_capture(&self) -> bool {
        matches!(self, MatchPattern::Capture { .. })
    }
}

impl fmt::Display for MatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPattern::Literal(text) => write!(f, "'{}'", text),
            MatchPattern::Capture { source, .. } => write!(f, "/{}/", source),
        }
    }
}

/// Parallel whitelist attached to a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParallelWhitelist {
    pub groups: BTreeSet<String>,
    pub nodes: BTreeSet<String>,
}

impl ParallelWhitelist {
    /// Whether a chain of `group` made of the dotted `nodes` may stay active.
    pub fn allows<'a>(&self, group: &str, mut nodes: impl Iterator<Item = &'a str>) -> bool {
        self.groups.contains(group) || nodes.any(|name| self.nodes.contains(name))
    }
}

/// One immutable node of the schema tree.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub(crate) id: NodeId,
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) depth: usize,
    pub(crate) pattern: MatchPattern,
    pub(crate) query: BTreeSet<String>,
    pub(crate) exact: bool,
    pub(crate) group: String,
    pub(crate) extension: IndexMap<String, Value>,
    pub(crate) parallel: Option<ParallelWhitelist>,
}

impl SchemaNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Key of the node in its parent's child map.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted path from the top level, e.g. `account.id`.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Distance from the top level (top-level nodes have depth 0).
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn pattern(&self) -> &MatchPattern {
        &self.pattern
    }

    pub fn query_keys(&self) -> &BTreeSet<String> {
        &self.query
    }

    /// Whether the node opted into exact matches despite having children.
    pub fn allows_exact(&self) -> bool {
        self.exact
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn extension_defaults(&self) -> &IndexMap<String, Value> {
        &self.extension
    }

    pub fn parallel(&self) -> Option<&ParallelWhitelist> {
        self.parallel.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture(pattern: &str, flags: &str) -> Result<MatchPattern, SchemaError> {
        MatchPattern::compile(
            "n",
            &PatternConfig::Capture {
                capture: pattern.into(),
                flags: flags.into(),
            },
        )
    }

    #[test]
    fn test_global_flag_rejected() {
        let err = capture("[0-9]+", "g").unwrap_err();
        assert!(matches!(err, SchemaError::GlobalPattern { .. }));
    }

    #[test]
    fn test_unknown_flag_rejected() {
        let err = capture("[0-9]+", "q").unwrap_err();
        assert!(matches!(err, SchemaError::UnknownFlag { flag: 'q', .. }));
    }

    #[test]
    fn test_multiple_groups_rejected() {
        let err = capture("([a-z]+)-([0-9]+)", "").unwrap_err();
        assert!(matches!(err, SchemaError::MultipleCaptures { .. }));
        assert!(capture("(?:[a-z]+)-([0-9]+)", "").is_ok());
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let err = capture("([0-9]+", "").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidPattern { .. }));
    }

    #[test]
    fn test_capture_is_anchored() {
        let MatchPattern::Capture { regex, .. } = capture("[0-9]+", "").unwrap() else {
            panic!("expected capture");
        };
        assert!(regex.is_match("42/x"));
        assert!(!regex.is_match("x42"));
    }

    #[test]
    fn test_whitelist_allows() {
        let whitelist = ParallelWhitelist {
            groups: BTreeSet::from(["side".to_string()]),
            nodes: BTreeSet::from(["modal.confirm".to_string()]),
        };
        assert!(whitelist.allows("side", std::iter::empty()));
        assert!(whitelist.allows("modal", ["modal", "modal.confirm"].into_iter()));
        assert!(!whitelist.allows("modal", ["modal"].into_iter()));
    }
}

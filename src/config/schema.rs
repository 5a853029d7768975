//! Route file schema definitions.
//!
//! This module defines the declarative structure a router is built from.
//! All types derive Serde traits for deserialization from route files.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root configuration for a router instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Path prefix every routed location starts with (e.g. "/app").
    pub prefix: String,

    /// Name of the group matched against the location path itself.
    pub primary_group: String,

    /// Location restored when a transition is cancelled before anything
    /// was ever committed.
    pub default_location: String,

    /// Logging settings.
    pub observability: ObservabilityConfig,

    /// Top-level route nodes, in declaration order.
    pub routes: IndexMap<String, RouteConfig>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            primary_group: "main".to_string(),
            default_location: "/".to_string(),
            observability: ObservabilityConfig::default(),
            routes: IndexMap::new(),
        }
    }
}

impl RouterConfig {
    /// Create an empty configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a top-level route.
    pub fn route(mut self, name: impl Into<String>, route: RouteConfig) -> Self {
        self.routes.insert(name.into(), route);
        self
    }

    /// Set the path prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the location used when reverting with nothing committed.
    pub fn with_default_location(mut self, location: impl Into<String>) -> Self {
        self.default_location = location.into();
        self
    }
}

/// One node of the route tree.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RouteConfig {
    /// Segment pattern. Defaults to the node name as a literal.
    #[serde(rename = "match", skip_serializing_if = "Option::is_none")]
    pub pattern: Option<PatternConfig>,

    /// Query keys this node reads into its params.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<String>,

    /// Allow an exact match here even though the node has children.
    pub exact: bool,

    /// Parallel group. Inherited from the parent when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Child nodes, in declaration order.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub children: IndexMap<String, RouteConfig>,

    /// Extension defaults exposed by the node.
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub extension: IndexMap<String, Value>,

    /// Groups or nodes allowed to stay active next to this node when it is
    /// the leaf of the primary chain.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel: Option<ParallelConfig>,
}

impl RouteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a literal segment.
    pub fn literal(mut self, segment: impl Into<String>) -> Self {
        self.pattern = Some(PatternConfig::Literal(segment.into()));
        self
    }

    /// Match a segment with a regular expression.
    pub fn capture(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(PatternConfig::Capture {
            capture: pattern.into(),
            flags: String::new(),
        });
        self
    }

    /// Match a segment with a regular expression and flags.
    pub fn capture_with_flags(mut self, pattern: impl Into<String>, flags: impl Into<String>) -> Self {
        self.pattern = Some(PatternConfig::Capture {
            capture: pattern.into(),
            flags: flags.into(),
        });
        self
    }

    pub fn exact(mut self) -> Self {
        self.exact = true;
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn query_key(mut self, key: impl Into<String>) -> Self {
        self.query.push(key.into());
        self
    }

    pub fn child(mut self, name: impl Into<String>, child: RouteConfig) -> Self {
        self.children.insert(name.into(), child);
        self
    }

    pub fn extension(mut self, key: impl Into<String>, default: impl Into<Value>) -> Self {
        self.extension.insert(key.into(), default.into());
        self
    }

    /// Allow the given groups next to this node.
    pub fn parallel_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parallel = self.parallel.get_or_insert_with(ParallelConfig::default);
        parallel.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    /// Allow chains containing the given nodes (dotted names) next to this node.
    pub fn parallel_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parallel = self.parallel.get_or_insert_with(ParallelConfig::default);
        parallel.nodes.extend(nodes.into_iter().map(Into::into));
        self
    }
}

/// Segment pattern as written in a route file.
///
/// ```toml
/// [routes.account]
/// match = "account"
///
/// [routes.account.children.id]
/// match = { capture = "[0-9]+" }
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PatternConfig {
    /// Literal segment text.
    Literal(String),

    /// Regular expression applied at the start of the remaining path.
    Capture {
        capture: String,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        flags: String,
    },
}

/// Parallel whitelist declared on a route node.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ParallelConfig {
    /// Group names allowed next to the node.
    pub groups: Vec<String>,

    /// Dotted node names allowed next to the node.
    pub nodes: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human readable format.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_route_file() {
        let raw = r#"
            prefix = "/app"

            [routes.default]
            match = ""

            [routes.account]
            extension = { title = "Account" }

            [routes.account.children.id]
            match = { capture = "[0-9]+" }
            query = ["tab"]
        "#;

        let config: RouterConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.prefix, "/app");
        assert_eq!(config.primary_group, "main");

        let names: Vec<_> = config.routes.keys().cloned().collect();
        assert_eq!(names, vec!["default", "account"]);

        let account = &config.routes["account"];
        assert!(account.pattern.is_none());
        assert_eq!(account.extension["title"], Value::from("Account"));

        let id = &account.children["id"];
        assert_eq!(
            id.pattern,
            Some(PatternConfig::Capture {
                capture: "[0-9]+".into(),
                flags: String::new()
            })
        );
        assert_eq!(id.query, vec!["tab".to_string()]);
    }

    #[test]
    fn test_unknown_route_key_rejected() {
        let raw = r#"
            [routes.home]
            mach = "home"
        "#;
        assert!(toml::from_str::<RouterConfig>(raw).is_err());
    }

    #[test]
    fn test_builder_matches_parsed_form() {
        let built = RouteConfig::new()
            .capture("[a-z]+")
            .group("side")
            .parallel_groups(["main"]);
        assert_eq!(built.group.as_deref(), Some("side"));
        assert_eq!(built.parallel.unwrap().groups, vec!["main".to_string()]);
    }
}

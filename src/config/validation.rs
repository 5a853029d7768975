//! Route file validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (parallel whitelists reference existing
//!   groups and nodes)
//! - Validate value shapes (prefix, default location, group names)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::BTreeSet;

use indexmap::IndexMap;
use thiserror::Error;

use crate::config::schema::{RouteConfig, RouterConfig};

/// A single semantic problem in a route file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("prefix '{0}' must be empty or start with '/' and not end with '/'")]
    Prefix(String),

    #[error("default location '{0}' must start with '/'")]
    DefaultLocation(String),

    #[error("group name '{group}' on '{node}' must be non-empty and use only [A-Za-z0-9_-]")]
    GroupName { node: String, group: String },

    #[error("query key '{key}' on '{node}' is reserved (keys starting with '_' carry group paths)")]
    ReservedQueryKey { node: String, key: String },

    #[error("parallel whitelist on '{node}' names unknown group '{group}'")]
    UnknownParallelGroup { node: String, group: String },

    #[error("parallel whitelist on '{node}' names unknown node '{target}'")]
    UnknownParallelNode { node: String, target: String },
}

/// Check a router configuration for semantic errors.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !config.prefix.is_empty() && (!config.prefix.starts_with('/') || config.prefix.ends_with('/')) {
        errors.push(ValidationError::Prefix(config.prefix.clone()));
    }

    if !config.default_location.starts_with('/') {
        errors.push(ValidationError::DefaultLocation(config.default_location.clone()));
    }

    if !is_valid_group(&config.primary_group) {
        errors.push(ValidationError::GroupName {
            node: "<router>".to_string(),
            group: config.primary_group.clone(),
        });
    }

    // First pass collects every node and group so whitelists can reference
    // nodes declared later in the file.
    let mut nodes = BTreeSet::new();
    let mut groups = BTreeSet::from([config.primary_group.clone()]);
    collect(&config.routes, "", &mut nodes, &mut groups);

    check_routes(&config.routes, "", &nodes, &groups, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_valid_group(group: &str) -> bool {
    !group.is_empty()
        && group
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn full_name(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn collect(
    routes: &IndexMap<String, RouteConfig>,
    parent: &str,
    nodes: &mut BTreeSet<String>,
    groups: &mut BTreeSet<String>,
) {
    for (name, route) in routes {
        let full = full_name(parent, name);
        if let Some(group) = &route.group {
            groups.insert(group.clone());
        }
        collect(&route.children, &full, nodes, groups);
        nodes.insert(full);
    }
}

fn check_routes(
    routes: &IndexMap<String, RouteConfig>,
    parent: &str,
    nodes: &BTreeSet<String>,
    groups: &BTreeSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    for (name, route) in routes {
        let full = full_name(parent, name);

        if let Some(group) = &route.group {
            if !is_valid_group(group) {
                errors.push(ValidationError::GroupName {
                    node: full.clone(),
                    group: group.clone(),
                });
            }
        }

        for key in &route.query {
            if key.starts_with('_') {
                errors.push(ValidationError::ReservedQueryKey {
                    node: full.clone(),
                    key: key.clone(),
                });
            }
        }

        if let Some(parallel) = &route.parallel {
            for group in &parallel.groups {
                if !groups.contains(group) {
                    errors.push(ValidationError::UnknownParallelGroup {
                        node: full.clone(),
                        group: group.clone(),
                    });
                }
            }
            for target in &parallel.nodes {
                if !nodes.contains(target) {
                    errors.push(ValidationError::UnknownParallelNode {
                        node: full.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        check_routes(&route.children, &full, nodes, groups, errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&RouterConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let config = RouterConfig::new()
            .with_prefix("app/")
            .with_default_location("home")
            .route(
                "inbox",
                RouteConfig::new()
                    .query_key("_side")
                    .parallel_groups(["nowhere"])
                    .parallel_nodes(["ghost"]),
            )
            .route("panel", RouteConfig::new().group("bad group"));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 6);
        assert!(errors.contains(&ValidationError::Prefix("app/".into())));
        assert!(errors.contains(&ValidationError::DefaultLocation("home".into())));
        assert!(errors.contains(&ValidationError::UnknownParallelNode {
            node: "inbox".into(),
            target: "ghost".into(),
        }));
    }

    #[test]
    fn test_whitelist_may_reference_later_nodes() {
        let config = RouterConfig::new()
            .route("inbox", RouteConfig::new().parallel_nodes(["panel.detail"]))
            .route(
                "panel",
                RouteConfig::new()
                    .group("side")
                    .child("detail", RouteConfig::new()),
            );
        assert!(validate_config(&config).is_ok());
    }
}

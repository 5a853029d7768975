//! Router-level errors.

use thiserror::Error;

use crate::config::ValidationError;
use crate::location::LocationError;
use crate::schema::SchemaError;

/// Errors surfaced by [`crate::Router`] and its match nodes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouterError {
    #[error("invalid route schema: {0}")]
    Schema(#[from] SchemaError),

    #[error("invalid router configuration: {}", join(.0))]
    Config(Vec<ValidationError>),

    #[error("location source failed: {0}")]
    Location(#[from] LocationError),

    #[error("no route node named '{0}'")]
    UnknownNode(String),

    #[error("building a ref to '{node}' requires parameter '{param}'")]
    MissingParam { node: String, param: String },

    #[error("parameter '{param}' = '{value}' does not fit the pattern of '{node}'")]
    InvalidParam {
        node: String,
        param: String,
        value: String,
    },

    #[error("a service is already bound to '{0}'")]
    DuplicateService(String),

    #[error("router stopped before the navigation settled")]
    Stopped,
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

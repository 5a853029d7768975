//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! route file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RouterConfig (validated, immutable)
//!     → schema::SchemaTree::build (compiled once per router)
//! ```
//!
//! # Design Decisions
//! - Route files are immutable once loaded; a new tree needs a new router
//! - All fields have defaults to allow minimal files
//! - Validation separates syntactic (serde) from semantic checks
//! - Route maps keep declaration order, which decides match precedence

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::ObservabilityConfig;
pub use schema::ParallelConfig;
pub use schema::PatternConfig;
pub use schema::RouteConfig;
pub use schema::RouterConfig;
pub use validation::{validate_config, ValidationError};

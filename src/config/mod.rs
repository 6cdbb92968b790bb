//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! repositories (repository.rs; TOML documents via loader.rs)
//!     → builder.rs reads backends, endpoints, routes
//!     → duplicate detection + validation.rs (pluggable RouteValidator)
//!     → ConfigSnapshot (snapshot.rs, immutable, ordered routes)
//!     → manager.rs reconciles runtime wrappers and probers
//!     → atomic swap of the published route table
//! ```
//!
//! # Design Decisions
//! - A snapshot is never mutated; every change produces a new one
//! - Per-item problems are reported (errors.rs) and skip only that item
//! - Repository failures and cancellation abort before any runtime change
//! - All schema fields have defaults to allow minimal configs

pub mod builder;
pub mod errors;
pub mod loader;
pub mod manager;
pub mod repository;
pub mod schema;
pub mod snapshot;
pub mod validation;

pub use builder::ConfigBuilder;
pub use errors::{
    CollectingErrorReporter, ConfigError, ConfigErrorCode, ConfigErrorReporter,
    LoggingErrorReporter, RepositoryError,
};
pub use manager::ConfigManager;
pub use repository::{
    BackendsRepository, EndpointsRepository, InMemoryConfigRepository, RoutesRepository,
};
pub use schema::{BackendConfig, EndpointConfig, RouteConfig};
pub use snapshot::{BackendWithEndpoints, ConfigSnapshot, ParsedRoute};
pub use validation::{DefaultRouteValidator, RouteValidator};

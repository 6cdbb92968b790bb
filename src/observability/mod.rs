//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! config builder, config manager, prober, load balancer
//!     → tracing events with structured fields (backend_id, endpoint_id, ...)
//!     → logging.rs subscriber (fmt layer, EnvFilter)
//! ```
//!
//! # Design Decisions
//! - Per-item configuration errors are logged at `warn` by the reporters
//! - Health transitions are logged at `info`, individual probe failures at
//!   `debug`

pub mod logging;

pub use logging::init_logging;

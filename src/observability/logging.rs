//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber for binaries and tests
//! - Honor `RUST_LOG`, falling back to a caller-provided filter
//!
//! # Design Decisions
//! - Uses the tracing crate; every event carries ids as structured fields
//! - Initialization is fallible instead of panicking when a subscriber is
//!   already installed

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor the caller give one.
pub const DEFAULT_FILTER: &str = "proxy_control=info";

/// Install a fmt subscriber filtered by `RUST_LOG`, or by `default_filter`
/// when the variable is unset or invalid.
pub fn init_logging(default_filter: &str) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

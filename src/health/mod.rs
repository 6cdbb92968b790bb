//! Active health checking.
//!
//! # Data Flow
//! ```text
//! ConfigManager (reconcile)
//!     → ProberFactory::create (factory.rs), one prober per backend
//!     → HealthProber (prober.rs): jittered start, then fixed interval
//!         → probe every published endpoint concurrently (probe.rs)
//!         → classify outcome, set endpoint HealthState (state.rs)
//!         → republish the backend's healthy endpoints
//! ```
//!
//! # Design Decisions
//! - Health is per endpoint; a backend owns at most one prober
//! - Probers are never reconfigured in place: new options mean a new prober
//! - Time goes through `Clock` (clock.rs) so tests run on virtual time

pub mod clock;
pub mod factory;
pub mod probe;
pub mod prober;
pub mod state;

pub use clock::{Clock, TokioClock};
pub use factory::ProberFactory;
pub use probe::{probe_uri, HyperProbeClient, ProbeClient, ProbeError, ProbeOutcome};
pub use prober::{HealthProber, ProberState};
pub use state::HealthState;

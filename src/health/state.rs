//! Endpoint health state.
//!
//! # States
//! - Unknown: never probed, or health checks were turned off
//! - Healthy: last probe succeeded
//! - Unhealthy: last probe failed
//!
//! # State Transitions
//! ```text
//! Unknown/Unhealthy → Healthy: successful probe
//! Unknown/Healthy → Unhealthy: failed probe (transport, HTTP status, timeout)
//! any → Unknown: active health checks disabled for the backend
//! ```
//!
//! # Design Decisions
//! - Stored as an `AtomicU8` on the endpoint; the prober is the only writer
//! - Unknown counts as healthy so fresh endpoints receive traffic

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthState {
    #[default]
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

impl HealthState {
    /// Whether an endpoint in this state may receive traffic.
    pub fn is_available(self) -> bool {
        self != HealthState::Unhealthy
    }
}

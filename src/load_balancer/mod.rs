//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → backend identified (external)
//!     → BackendInfo::dynamic_state() (healthy endpoints, lock-free)
//!     → LoadBalancer::pick_with_position with the backend's mode and position:
//!         - random (default, uniform)
//!         - first
//!         - round_robin.rs (rotate through endpoints)
//!         - least_requests.rs (fewest in-flight requests, power of two choices)
//!     → Return endpoint or None when no destination is available
//! ```
//!
//! # Design Decisions
//! - Selection has no side effects on the candidate set
//! - Every call gets its own random generator from a `RandomFactory`
//! - Round-robin position lives on the runtime backend; `pick_destination`
//!   falls back to a position owned by the balancer

pub mod least_requests;
pub mod random;
pub mod round_robin;

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::runtime::{BackendInfo, EndpointInfo};

pub use random::{RandomFactory, SeededRandomFactory, ThreadRandomFactory};
pub use round_robin::RoundRobin;

/// Destination selection policy of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingMode {
    /// Uniformly random.
    #[default]
    Random,
    /// Always the first candidate.
    First,
    /// Rotate through candidates.
    RoundRobin,
    /// Fewest concurrent requests.
    LeastRequests,
    /// Less loaded of two random candidates.
    PowerOfTwoChoices,
}

/// Picks destinations among a backend's candidates.
#[derive(Debug)]
pub struct LoadBalancer<F = ThreadRandomFactory> {
    random: F,
    /// Rotation used when no per-backend position is supplied.
    round_robin: RoundRobin,
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new(ThreadRandomFactory)
    }
}

impl<F: RandomFactory> LoadBalancer<F> {
    pub fn new(random: F) -> Self {
        Self {
            random,
            round_robin: RoundRobin::new(),
        }
    }

    /// Pick one destination out of `candidates`.
    ///
    /// `None` means no destination is available. Round-robin rotates through
    /// a position owned by this balancer.
    pub fn pick_destination(
        &self,
        candidates: &[Arc<EndpointInfo>],
        mode: LoadBalancingMode,
    ) -> Option<Arc<EndpointInfo>> {
        self.pick_with_position(candidates, mode, &self.round_robin)
    }

    /// Like [`pick_destination`](Self::pick_destination), rotating through
    /// `round_robin` instead, e.g. a backend's own position.
    pub fn pick_with_position(
        &self,
        candidates: &[Arc<EndpointInfo>],
        mode: LoadBalancingMode,
        round_robin: &RoundRobin,
    ) -> Option<Arc<EndpointInfo>> {
        if candidates.is_empty() {
            return None;
        }
        if candidates.len() == 1 {
            return candidates.first().cloned();
        }

        let picked = match mode {
            LoadBalancingMode::First => candidates.first(),
            LoadBalancingMode::Random => {
                let mut rng = self.random.create();
                candidates.get(rng.gen_range(0..candidates.len()))
            }
            LoadBalancingMode::RoundRobin => candidates.get(round_robin.next_index(candidates.len())),
            LoadBalancingMode::LeastRequests => least_requests::least_requests(candidates),
            LoadBalancingMode::PowerOfTwoChoices => {
                let mut rng = self.random.create();
                least_requests::power_of_two_choices(rng.as_mut(), candidates)
            }
        };
        picked.cloned()
    }

    /// Pick among the backend's healthy endpoints using its configured mode.
    pub fn pick_for_backend(&self, backend: &BackendInfo) -> Option<Arc<EndpointInfo>> {
        let state = backend.dynamic_state();
        let mode = backend.config().load_balancing.mode;
        let picked = self.pick_with_position(&state.healthy_endpoints, mode, backend.round_robin());
        if picked.is_none() {
            tracing::debug!(
                backend_id = %backend.backend_id(),
                endpoint_count = state.all_endpoints.len(),
                "No healthy endpoints found for backend"
            );
        }
        picked
    }
}

//! Runtime backends.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::config::schema::{BackendConfig, BackendId};
use crate::health::HealthProber;
use crate::load_balancer::round_robin::RoundRobin;
use crate::runtime::endpoint::{DynamicState, EndpointManager};
use crate::runtime::manager::ItemManager;

/// Runtime backends keyed by backend id.
pub type BackendManager = ItemManager<BackendInfo>;

/// Identity-stable runtime wrapper of a backend.
///
/// Lives as long as its id keeps appearing in applied snapshots. Owns the
/// backend's endpoint manager, its round-robin position and, when active
/// health checks are on, its prober.
#[derive(Debug)]
pub struct BackendInfo {
    backend_id: BackendId,
    config: ArcSwap<BackendConfig>,
    endpoints: Arc<EndpointManager>,
    prober: Mutex<Option<Arc<HealthProber>>>,
    round_robin: RoundRobin,
}

impl BackendInfo {
    pub fn new(backend_id: &str, config: Arc<BackendConfig>) -> Self {
        Self {
            backend_id: backend_id.to_string(),
            config: ArcSwap::new(config),
            endpoints: Arc::new(EndpointManager::new(backend_id)),
            prober: Mutex::new(None),
            round_robin: RoundRobin::new(),
        }
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    pub fn config(&self) -> Arc<BackendConfig> {
        self.config.load_full()
    }

    pub fn set_config(&self, config: Arc<BackendConfig>) {
        self.config.store(config);
    }

    pub fn endpoints(&self) -> &Arc<EndpointManager> {
        &self.endpoints
    }

    /// Shortcut for the endpoint manager's published state.
    pub fn dynamic_state(&self) -> Arc<DynamicState> {
        self.endpoints.dynamic_state()
    }

    pub fn round_robin(&self) -> &RoundRobin {
        &self.round_robin
    }

    /// The attached prober, if any.
    pub fn prober(&self) -> Option<Arc<HealthProber>> {
        self.prober.lock().clone()
    }

    /// Attach a prober, returning the one it displaces.
    pub fn attach_prober(&self, prober: Arc<HealthProber>) -> Option<Arc<HealthProber>> {
        self.prober.lock().replace(prober)
    }

    pub fn detach_prober(&self) -> Option<Arc<HealthProber>> {
        self.prober.lock().take()
    }
}

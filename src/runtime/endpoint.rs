//! Runtime endpoints and the per-backend endpoint manager.
//!
//! # Responsibilities
//! - Represent a single destination with its live state
//! - Track concurrent requests (for least-requests balancing)
//! - Track health state (Unknown/Healthy/Unhealthy)
//! - Publish the backend's destination list copy-on-write

use std::ops::Deref;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::config::schema::{BackendId, EndpointConfig, EndpointId};
use crate::health::HealthState;
use crate::runtime::manager::ItemManager;

/// A single destination behind a backend.
#[derive(Debug)]
pub struct EndpointInfo {
    backend_id: BackendId,
    endpoint_id: EndpointId,
    config: ArcSwap<EndpointConfig>,
    /// Current health state (0=Unknown, 1=Healthy, 2=Unhealthy).
    health: AtomicU8,
    /// Number of requests currently in flight.
    concurrent_requests: AtomicUsize,
}

impl EndpointInfo {
    pub fn new(backend_id: &str, endpoint_id: &str, config: Arc<EndpointConfig>) -> Self {
        Self {
            backend_id: backend_id.to_string(),
            endpoint_id: endpoint_id.to_string(),
            config: ArcSwap::new(config),
            health: AtomicU8::new(HealthState::Unknown as u8),
            concurrent_requests: AtomicUsize::new(0),
        }
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    pub fn endpoint_id(&self) -> &str {
        &self.endpoint_id
    }

    /// Current configuration.
    pub fn config(&self) -> Arc<EndpointConfig> {
        self.config.load_full()
    }

    /// Replace the configuration as a whole; live state is kept.
    pub fn set_config(&self, config: Arc<EndpointConfig>) {
        self.config.store(config);
    }

    pub fn health_state(&self) -> HealthState {
        HealthState::from(self.health.load(Ordering::Acquire))
    }

    /// Set the health state and return the previous one.
    pub fn set_health_state(&self, state: HealthState) -> HealthState {
        HealthState::from(self.health.swap(state as u8, Ordering::AcqRel))
    }

    /// Return true if the endpoint may receive traffic (Healthy or Unknown).
    pub fn is_healthy(&self) -> bool {
        self.health_state().is_available()
    }

    pub fn concurrent_requests(&self) -> usize {
        self.concurrent_requests.load(Ordering::Relaxed)
    }

    /// Count a request against this endpoint until the guard is dropped.
    pub fn begin_request(self: &Arc<Self>) -> RequestGuard {
        self.concurrent_requests.fetch_add(1, Ordering::Relaxed);
        RequestGuard {
            endpoint: self.clone(),
        }
    }
}

/// A RAII guard that manages the concurrent request count.
#[derive(Debug)]
pub struct RequestGuard {
    endpoint: Arc<EndpointInfo>,
}

impl Deref for RequestGuard {
    type Target = EndpointInfo;
    fn deref(&self) -> &Self::Target {
        &self.endpoint
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.endpoint.concurrent_requests.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Published view of a backend's endpoints.
#[derive(Debug, Default)]
pub struct DynamicState {
    /// Every endpoint, ordered by id.
    pub all_endpoints: Vec<Arc<EndpointInfo>>,
    /// Endpoints not marked Unhealthy, ordered by id.
    pub healthy_endpoints: Vec<Arc<EndpointInfo>>,
}

impl DynamicState {
    fn new(all_endpoints: Vec<Arc<EndpointInfo>>) -> Self {
        let healthy_endpoints = all_endpoints
            .iter()
            .filter(|e| e.is_healthy())
            .cloned()
            .collect();
        Self {
            all_endpoints,
            healthy_endpoints,
        }
    }

    pub fn endpoint_ids(&self) -> Vec<&str> {
        self.all_endpoints.iter().map(|e| e.endpoint_id()).collect()
    }
}

/// Endpoints of one backend.
///
/// Membership changes made through [`get_or_create`](Self::get_or_create)
/// and [`remove`](Self::remove) become visible to readers only on
/// [`publish`](Self::publish), which swaps in a freshly built
/// [`DynamicState`]. Readers never lock.
#[derive(Debug)]
pub struct EndpointManager {
    backend_id: BackendId,
    items: ItemManager<EndpointInfo>,
    state: ArcSwap<DynamicState>,
    /// Serializes the writers of `state`.
    publish_lock: Mutex<()>,
}

impl EndpointManager {
    pub fn new(backend_id: &str) -> Self {
        Self {
            backend_id: backend_id.to_string(),
            items: ItemManager::new(),
            state: ArcSwap::from_pointee(DynamicState::default()),
            publish_lock: Mutex::new(()),
        }
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    pub fn get_or_create(
        &self,
        endpoint_id: &str,
        config: impl FnOnce() -> Arc<EndpointConfig>,
    ) -> (Arc<EndpointInfo>, bool) {
        self.items
            .get_or_create(endpoint_id, |id| EndpointInfo::new(&self.backend_id, id, config()))
    }

    pub fn try_get(&self, endpoint_id: &str) -> Option<Arc<EndpointInfo>> {
        self.items.try_get(endpoint_id)
    }

    pub fn remove(&self, endpoint_id: &str) -> Option<Arc<EndpointInfo>> {
        self.items.remove(endpoint_id)
    }

    /// Ids currently held, including unpublished changes.
    pub fn ids(&self) -> Vec<String> {
        self.items.ids()
    }

    /// The last published state.
    pub fn dynamic_state(&self) -> Arc<DynamicState> {
        self.state.load_full()
    }

    /// Publish the current membership to readers.
    pub fn publish(&self) {
        let _guard = self.publish_lock.lock();
        let all = self.items.items().into_iter().map(|(_, e)| e).collect();
        self.state.store(Arc::new(DynamicState::new(all)));
    }

    /// Recompute the healthy subset after health flags changed, keeping the
    /// published membership.
    pub fn refresh_health(&self) {
        let _guard = self.publish_lock.lock();
        let all = self.state.load().all_endpoints.clone();
        self.state.store(Arc::new(DynamicState::new(all)));
    }

    /// Mark every endpoint Unknown, e.g. when health checks are turned off.
    pub fn reset_health(&self) {
        for (_, endpoint) in self.items.items() {
            endpoint.set_health_state(HealthState::Unknown);
        }
        self.refresh_health();
    }
}

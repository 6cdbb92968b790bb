//! Immutable configuration snapshots produced by the config builder.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::schema::{
    BackendConfig, BackendId, EndpointMap, Metadata, RouteConfig, RouteId,
};

/// A route that passed duplicate detection, ready for validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRoute {
    pub route_id: RouteId,
    pub methods: Vec<String>,
    pub host: Option<String>,
    pub path: Option<String>,
    pub priority: Option<i32>,
    pub backend_id: BackendId,
    pub metadata: Metadata,
}

impl ParsedRoute {
    /// Priority used for ordering; an absent priority sorts as 0.
    pub fn effective_priority(&self) -> i32 {
        self.priority.unwrap_or(0)
    }

    /// Total order used for route evaluation: ascending priority, then id.
    pub fn evaluation_order(&self, other: &Self) -> Ordering {
        self.effective_priority()
            .cmp(&other.effective_priority())
            .then_with(|| self.route_id.cmp(&other.route_id))
    }
}

impl From<RouteConfig> for ParsedRoute {
    fn from(route: RouteConfig) -> Self {
        Self {
            route_id: route.id,
            methods: route.matches.methods,
            host: route.matches.host,
            path: route.matches.path,
            priority: route.priority,
            backend_id: route.backend_id,
            metadata: route.metadata,
        }
    }
}

/// A backend together with the endpoints read for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendWithEndpoints {
    pub config: Arc<BackendConfig>,
    pub endpoints: EndpointMap,
}

/// Point-in-time view of all routes and backends.
///
/// Never mutated after the builder returns it; a configuration change
/// always produces a new snapshot.
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    routes: Arc<[Arc<ParsedRoute>]>,
    backends: Arc<HashMap<BackendId, BackendWithEndpoints>>,
}

impl ConfigSnapshot {
    /// `routes` must already be in evaluation order.
    pub(crate) fn new(
        routes: Vec<Arc<ParsedRoute>>,
        backends: HashMap<BackendId, BackendWithEndpoints>,
    ) -> Self {
        Self {
            routes: routes.into(),
            backends: Arc::new(backends),
        }
    }

    /// Routes in evaluation order.
    pub fn routes(&self) -> &[Arc<ParsedRoute>] {
        &self.routes
    }

    pub fn backends(&self) -> &HashMap<BackendId, BackendWithEndpoints> {
        &self.backends
    }

    pub fn route_ids(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.route_id.as_str()).collect()
    }
}

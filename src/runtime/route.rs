//! Runtime routes and the published route table.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::schema::RouteId;
use crate::config::snapshot::ParsedRoute;
use crate::runtime::manager::ItemManager;

/// Runtime routes keyed by route id.
pub type RouteManager = ItemManager<RouteInfo>;

/// Identity-stable runtime wrapper of a route.
#[derive(Debug)]
pub struct RouteInfo {
    route_id: RouteId,
    config: ArcSwap<ParsedRoute>,
}

impl RouteInfo {
    pub fn new(config: Arc<ParsedRoute>) -> Self {
        Self {
            route_id: config.route_id.clone(),
            config: ArcSwap::new(config),
        }
    }

    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    pub fn config(&self) -> Arc<ParsedRoute> {
        self.config.load_full()
    }

    pub fn set_config(&self, config: Arc<ParsedRoute>) {
        self.config.store(config);
    }
}

/// Routes in evaluation order: ascending priority, then id.
#[derive(Debug, Default, Clone)]
pub struct RouteTable {
    routes: Vec<Arc<RouteInfo>>,
}

impl RouteTable {
    pub(crate) fn new(routes: Vec<Arc<RouteInfo>>) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &[Arc<RouteInfo>] {
        &self.routes
    }

    pub fn route_ids(&self) -> Vec<&str> {
        self.routes.iter().map(|r| r.route_id()).collect()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

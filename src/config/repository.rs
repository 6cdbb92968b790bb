//! Configuration repositories.
//!
//! Repositories are the boundary to whatever stores configuration (files,
//! discovery, orchestrators). Every read hands out an owned copy, so callers
//! may mutate what they get back without affecting the repository or other
//! readers.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::config::errors::RepositoryError;
use crate::config::loader::ConfigDocument;
use crate::config::schema::{BackendConfig, BackendId, EndpointMap, RouteConfig};

/// Source of route definitions.
#[async_trait]
pub trait RoutesRepository: Send + Sync {
    /// Current routes. `None` is treated as an empty list.
    async fn get_routes(&self) -> Result<Option<Vec<RouteConfig>>, RepositoryError>;
}

/// Source of backend definitions.
#[async_trait]
pub trait BackendsRepository: Send + Sync {
    /// Current backends keyed by id. `None` is treated as an empty map.
    async fn get_backends(
        &self,
    ) -> Result<Option<HashMap<BackendId, BackendConfig>>, RepositoryError>;
}

/// Source of endpoints per backend.
#[async_trait]
pub trait EndpointsRepository: Send + Sync {
    /// Endpoints of one backend. `None` is treated as no endpoints.
    async fn get_endpoints(
        &self,
        backend_id: &str,
    ) -> Result<Option<EndpointMap>, RepositoryError>;
}

#[derive(Debug, Default)]
struct Contents {
    routes: Option<Vec<RouteConfig>>,
    backends: Option<HashMap<BackendId, BackendConfig>>,
    endpoints: HashMap<BackendId, EndpointMap>,
}

/// Repository holding everything in memory. Implements all three
/// repository traits.
#[derive(Debug, Default)]
pub struct InMemoryConfigRepository {
    contents: RwLock<Contents>,
}

impl InMemoryConfigRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a repository seeded from a parsed configuration document.
    pub fn from_document(document: ConfigDocument) -> Self {
        let repo = Self::new();
        repo.load_document(document);
        repo
    }

    /// Replace all contents with the given document.
    pub fn load_document(&self, document: ConfigDocument) {
        let mut backends = HashMap::with_capacity(document.backends.len());
        let mut endpoints = HashMap::with_capacity(document.backends.len());
        for (id, backend) in document.backends {
            endpoints.insert(id.clone(), backend.endpoints);
            backends.insert(id, backend.config);
        }

        let mut contents = self.contents.write();
        contents.routes = Some(document.routes);
        contents.backends = Some(backends);
        contents.endpoints = endpoints;
    }

    pub fn set_routes(&self, routes: &[RouteConfig]) {
        self.contents.write().routes = Some(routes.to_vec());
    }

    pub fn set_backends(&self, backends: &HashMap<BackendId, BackendConfig>) {
        self.contents.write().backends = Some(backends.clone());
    }

    pub fn set_endpoints(&self, backend_id: &str, endpoints: &EndpointMap) {
        self.contents
            .write()
            .endpoints
            .insert(backend_id.to_string(), endpoints.clone());
    }

    pub fn remove_endpoints(&self, backend_id: &str) {
        self.contents.write().endpoints.remove(backend_id);
    }
}

#[async_trait]
impl RoutesRepository for InMemoryConfigRepository {
    async fn get_routes(&self) -> Result<Option<Vec<RouteConfig>>, RepositoryError> {
        Ok(self.contents.read().routes.clone())
    }
}

#[async_trait]
impl BackendsRepository for InMemoryConfigRepository {
    async fn get_backends(
        &self,
    ) -> Result<Option<HashMap<BackendId, BackendConfig>>, RepositoryError> {
        Ok(self.contents.read().backends.clone())
    }
}

#[async_trait]
impl EndpointsRepository for InMemoryConfigRepository {
    async fn get_endpoints(
        &self,
        backend_id: &str,
    ) -> Result<Option<EndpointMap>, RepositoryError> {
        Ok(self.contents.read().endpoints.get(backend_id).cloned())
    }
}

//! Builds immutable configuration snapshots from the repositories.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::config::errors::{ConfigError, ConfigErrorCode, ConfigErrorReporter};
use crate::config::repository::{BackendsRepository, EndpointsRepository, RoutesRepository};
use crate::config::schema::{RouteConfig, RouteId};
use crate::config::snapshot::{BackendWithEndpoints, ConfigSnapshot, ParsedRoute};
use crate::config::validation::RouteValidator;

/// Reads the repositories and turns their contents into a validated,
/// ordered [`ConfigSnapshot`].
pub struct ConfigBuilder {
    routes: Arc<dyn RoutesRepository>,
    backends: Arc<dyn BackendsRepository>,
    endpoints: Arc<dyn EndpointsRepository>,
    validator: Arc<dyn RouteValidator>,
}

impl ConfigBuilder {
    pub fn new(
        routes: Arc<dyn RoutesRepository>,
        backends: Arc<dyn BackendsRepository>,
        endpoints: Arc<dyn EndpointsRepository>,
        validator: Arc<dyn RouteValidator>,
    ) -> Self {
        Self {
            routes,
            backends,
            endpoints,
            validator,
        }
    }

    /// Build a snapshot.
    ///
    /// Invalid or duplicate routes are reported and dropped. A repository
    /// failure fails the whole build.
    pub async fn build_config(
        &self,
        reporter: &dyn ConfigErrorReporter,
    ) -> Result<ConfigSnapshot, ConfigError> {
        let backend_configs = self
            .backends
            .get_backends()
            .await
            .map_err(|error| ConfigError::Repository {
                source_name: "backends",
                error,
            })?
            .unwrap_or_default();

        let mut backends = HashMap::with_capacity(backend_configs.len());
        for (id, config) in backend_configs {
            let endpoints = self
                .endpoints
                .get_endpoints(&id)
                .await
                .map_err(|error| ConfigError::Repository {
                    source_name: "endpoints",
                    error,
                })?
                .unwrap_or_default();

            backends.insert(
                id,
                BackendWithEndpoints {
                    config: Arc::new(config),
                    endpoints,
                },
            );
        }

        let routes = self
            .routes
            .get_routes()
            .await
            .map_err(|error| ConfigError::Repository {
                source_name: "routes",
                error,
            })?
            .unwrap_or_default();

        let routes = self.parse_routes(routes, reporter);

        tracing::debug!(
            routes = routes.len(),
            backends = backends.len(),
            "Configuration snapshot built"
        );

        Ok(ConfigSnapshot::new(routes, backends))
    }

    fn parse_routes(
        &self,
        routes: Vec<RouteConfig>,
        reporter: &dyn ConfigErrorReporter,
    ) -> Vec<Arc<ParsedRoute>> {
        let mut seen: HashSet<RouteId> = HashSet::with_capacity(routes.len());
        let mut sorted: BTreeMap<(i32, RouteId), Arc<ParsedRoute>> = BTreeMap::new();

        for route in routes {
            if !seen.insert(route.id.clone()) {
                reporter.report_error(
                    ConfigErrorCode::DuplicateRouteId,
                    &route.id,
                    &format!("duplicate route id '{}'", route.id),
                );
                continue;
            }

            let parsed = ParsedRoute::from(route);
            if !self.validator.validate(&parsed, reporter) {
                continue;
            }

            let key = (parsed.effective_priority(), parsed.route_id.clone());
            sorted.insert(key, Arc::new(parsed));
        }

        sorted.into_values().collect()
    }
}

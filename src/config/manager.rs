//! Applies configuration snapshots to the runtime state.
//!
//! # Responsibilities
//! - Build a snapshot and reconcile backends, endpoints and routes against it
//! - Keep runtime wrappers identity-stable while their ids keep appearing
//! - Create, replace and stop health probers as backend options change
//! - Publish the ordered route table in one swap

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::config::builder::ConfigBuilder;
use crate::config::errors::{ConfigError, ConfigErrorCode, ConfigErrorReporter};
use crate::config::schema::{ActiveHealthCheckOptions, EndpointConfig, EndpointMap};
use crate::config::snapshot::ConfigSnapshot;
use crate::config::validation::{parse_endpoint_address, validate_active_health_check};
use crate::health::{HealthProber, ProberFactory};
use crate::runtime::{
    BackendInfo, BackendManager, EndpointManager, RouteInfo, RouteManager, RouteTable,
};

/// Owner of the runtime state derived from configuration.
///
/// Applies are single-flight: a second caller waits for the first one to
/// finish. Readers (`route_table`, `backends`, the endpoint managers) never
/// wait on an apply.
pub struct ConfigManager {
    builder: ConfigBuilder,
    prober_factory: ProberFactory,
    backends: BackendManager,
    routes: RouteManager,
    route_table: ArcSwap<RouteTable>,
    snapshot: ArcSwapOption<ConfigSnapshot>,
    apply_lock: tokio::sync::Mutex<()>,
    shut_down: AtomicBool,
}

/// A prober detached during reconciliation. Its stop is already requested.
struct RetiredProber {
    prober: Arc<HealthProber>,
    /// Endpoints to mark Unknown once the prober has exited.
    reset_health: Option<Arc<EndpointManager>>,
}

impl ConfigManager {
    pub fn new(builder: ConfigBuilder, prober_factory: ProberFactory) -> Self {
        Self {
            builder,
            prober_factory,
            backends: BackendManager::new(),
            routes: RouteManager::new(),
            route_table: ArcSwap::from_pointee(RouteTable::default()),
            snapshot: ArcSwapOption::empty(),
            apply_lock: tokio::sync::Mutex::new(()),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn backends(&self) -> &BackendManager {
        &self.backends
    }

    pub fn routes(&self) -> &RouteManager {
        &self.routes
    }

    /// The last published route table, in evaluation order.
    pub fn route_table(&self) -> Arc<RouteTable> {
        self.route_table.load_full()
    }

    /// The snapshot of the last successful apply.
    pub fn snapshot(&self) -> Option<Arc<ConfigSnapshot>> {
        self.snapshot.load_full()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Build a new snapshot and reconcile the runtime state with it.
    ///
    /// Cancellation is honored while waiting for a previous apply and during
    /// the build. A cancelled or failed build returns an error and leaves the
    /// runtime state untouched. Per-item problems go to `reporter` and only
    /// skip the offending item.
    ///
    /// Reconciliation and publishing happen without suspending, so dropping
    /// the returned future never leaves a partially applied snapshot. The
    /// only later await is for replaced probers to exit.
    pub async fn apply_configurations(
        &self,
        reporter: &dyn ConfigErrorReporter,
        cancel: &CancellationToken,
    ) -> Result<(), ConfigError> {
        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ConfigError::Cancelled),
            guard = self.apply_lock.lock() => guard,
        };
        if self.is_shut_down() {
            return Err(ConfigError::ShutDown);
        }

        let built = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ConfigError::Cancelled),
            result = self.builder.build_config(reporter) => result,
        };
        let snapshot = match built {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                tracing::warn!(error = %e, "Configuration not applied");
                return Err(e);
            }
        };

        let retired = self.update_backends(&snapshot, reporter);
        let table = self.update_routes(&snapshot);

        tracing::info!(
            routes = table.len(),
            backends = self.backends.len(),
            "Configuration applied"
        );

        self.route_table.store(Arc::new(table));
        self.snapshot.store(Some(snapshot));

        join_all(retired.iter().map(|r| r.prober.wait_stopped())).await;
        for retired in &retired {
            // A cycle that finished while the stop was pending may have
            // written flags after the first reset.
            if let Some(endpoints) = &retired.reset_health {
                endpoints.reset_health();
            }
        }
        Ok(())
    }

    /// Stop every attached prober and wait for them to exit. Later applies
    /// fail with [`ConfigError::ShutDown`].
    pub async fn shutdown(&self) {
        let _guard = self.apply_lock.lock().await;
        self.shut_down.store(true, Ordering::Release);
        let probers: Vec<_> = self
            .backends
            .items()
            .into_iter()
            .filter_map(|(_, backend)| backend.detach_prober())
            .collect();

        for prober in &probers {
            prober.request_stop();
        }
        join_all(probers.iter().map(|prober| prober.wait_stopped())).await;
        tracing::info!(probers = probers.len(), "Config manager shut down");
    }

    fn update_backends(
        &self,
        snapshot: &ConfigSnapshot,
        reporter: &dyn ConfigErrorReporter,
    ) -> Vec<RetiredProber> {
        let mut retired = Vec::new();
        let mut desired: Vec<_> = snapshot.backends().iter().collect();
        desired.sort_by(|a, b| a.0.cmp(b.0));

        for (backend_id, backend) in desired {
            let (info, created) = self
                .backends
                .get_or_create(backend_id, |id| BackendInfo::new(id, Arc::clone(&backend.config)));
            if created {
                tracing::info!(backend_id = %backend_id, "Backend added");
            } else {
                info.set_config(Arc::clone(&backend.config));
            }

            update_endpoints(&info, &backend.endpoints, reporter);
            self.update_prober(&info, reporter, &mut retired);
        }

        for (backend_id, info) in self.backends.items() {
            if snapshot.backends().contains_key(&backend_id) {
                continue;
            }
            if let Some(prober) = info.detach_prober() {
                prober.request_stop();
                retired.push(RetiredProber {
                    prober,
                    reset_health: None,
                });
            }
            self.backends.remove(&backend_id);
            tracing::info!(backend_id = %backend_id, "Backend removed");
        }

        retired
    }

    fn update_prober(
        &self,
        backend: &BackendInfo,
        reporter: &dyn ConfigErrorReporter,
        retired: &mut Vec<RetiredProber>,
    ) {
        let options = backend.config().health_check.active.clone();
        if let Err(e) = validate_active_health_check(&options) {
            reporter.report_error(
                ConfigErrorCode::InvalidHealthCheckOptions,
                backend.backend_id(),
                &e.to_string(),
            );
            return;
        }

        match (options.enabled, backend.prober()) {
            (true, None) => self.start_prober(backend, options),
            (true, Some(current)) if *current.options() != options => {
                backend.detach_prober();
                current.request_stop();
                retired.push(RetiredProber {
                    prober: current,
                    reset_health: None,
                });
                self.start_prober(backend, options);
                tracing::info!(backend_id = %backend.backend_id(), "Health prober replaced");
            }
            (false, Some(current)) => {
                backend.detach_prober();
                current.request_stop();
                backend.endpoints().reset_health();
                retired.push(RetiredProber {
                    prober: current,
                    reset_health: Some(Arc::clone(backend.endpoints())),
                });
                tracing::info!(backend_id = %backend.backend_id(), "Health prober removed");
            }
            (true, Some(_)) | (false, None) => {}
        }
    }

    fn start_prober(&self, backend: &BackendInfo, options: ActiveHealthCheckOptions) {
        let prober = self.prober_factory.create(
            backend.backend_id(),
            options,
            Arc::clone(backend.endpoints()),
        );
        backend.attach_prober(Arc::clone(&prober));
        prober.start();
    }

    fn update_routes(&self, snapshot: &ConfigSnapshot) -> RouteTable {
        let mut table = Vec::with_capacity(snapshot.routes().len());
        let mut seen = HashSet::with_capacity(snapshot.routes().len());

        for route in snapshot.routes() {
            let (info, created) = self
                .routes
                .get_or_create(&route.route_id, |_| RouteInfo::new(Arc::clone(route)));
            if !created && *info.config() != **route {
                info.set_config(Arc::clone(route));
            }
            seen.insert(route.route_id.as_str());
            table.push(info);
        }

        for route_id in self.routes.ids() {
            if !seen.contains(route_id.as_str()) {
                self.routes.remove(&route_id);
                tracing::debug!(route_id = %route_id, "Route removed");
            }
        }

        RouteTable::new(table)
    }
}

/// Reconcile a backend's endpoints and publish the result once.
fn update_endpoints(
    backend: &BackendInfo,
    desired: &EndpointMap,
    reporter: &dyn ConfigErrorReporter,
) {
    let manager = backend.endpoints();
    let mut valid = HashSet::with_capacity(desired.len());

    for (endpoint_id, config) in desired {
        if let Err(message) = check_endpoint(config) {
            reporter.report_error(
                ConfigErrorCode::InvalidEndpointAddress,
                &format!("{}/{}", backend.backend_id(), endpoint_id),
                &message,
            );
            continue;
        }
        valid.insert(endpoint_id.as_str());

        let (endpoint, created) = manager.get_or_create(endpoint_id, || Arc::new(config.clone()));
        if !created && *endpoint.config() != *config {
            endpoint.set_config(Arc::new(config.clone()));
        }
    }

    for endpoint_id in manager.ids() {
        if !valid.contains(endpoint_id.as_str()) {
            manager.remove(&endpoint_id);
        }
    }

    manager.publish();
}

fn check_endpoint(config: &EndpointConfig) -> Result<(), String> {
    parse_endpoint_address(&config.address)
        .map_err(|e| format!("address '{}': {}", config.address, e))?;
    if let Some(health) = &config.health {
        parse_endpoint_address(health).map_err(|e| format!("health address '{}': {}", health, e))?;
    }
    Ok(())
}

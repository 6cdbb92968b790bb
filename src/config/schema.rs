//! Configuration schema definitions.
//!
//! These are the plain value types handed over by the configuration
//! repositories. They carry no runtime state; the runtime wrappers in
//! [`crate::runtime`] hold an `Arc` to the current value and swap it on
//! reload. All types derive Serde traits so they can be deserialized from
//! configuration documents.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Route identifier, unique across the whole configuration.
pub type RouteId = String;

/// Backend identifier, the key of the backend map.
pub type BackendId = String;

/// Endpoint identifier, unique within its backend only.
pub type EndpointId = String;

/// Free-form metadata attached to config entities.
pub type Metadata = HashMap<String, String>;

/// Route configuration mapping requests to a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Route identifier.
    pub id: RouteId,

    /// Match conditions.
    #[serde(rename = "match")]
    pub matches: RouteMatch,

    /// Route priority. Lower values are evaluated first; `None` sorts as 0.
    pub priority: Option<i32>,

    /// Backend to forward to. Not checked against the backend map here.
    pub backend_id: BackendId,

    /// Arbitrary route metadata.
    pub metadata: Metadata,
}

/// Match conditions of a route. All present conditions must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RouteMatch {
    /// Allowed HTTP methods. Empty means any method.
    pub methods: Vec<String>,

    /// Host to match, optionally with a leading `*.` wildcard label.
    pub host: Option<String>,

    /// Path template, e.g. `/api/{**rest}`.
    pub path: Option<String>,
}

/// A backend: a named group of equivalent endpoints sharing policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    pub circuit_breaker: CircuitBreakerOptions,

    pub quota: QuotaOptions,

    pub partitioning: PartitioningOptions,

    pub load_balancing: LoadBalancingOptions,

    pub health_check: HealthCheckOptions,

    pub metadata: Metadata,
}

/// A single destination behind a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Destination address, e.g. `http://10.0.0.1:8080/`.
    pub address: String,

    /// Address probed by active health checks instead of `address`.
    pub health: Option<String>,

    pub metadata: Metadata,
}

impl EndpointConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    /// Address used for health probes.
    pub fn health_address(&self) -> &str {
        self.health.as_deref().unwrap_or(&self.address)
    }
}

/// Circuit breaker settings. Modeled only; enforcement lives in the
/// forwarding layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerOptions {
    pub max_concurrent_requests: Option<u32>,
    pub max_concurrent_retries: Option<u32>,
}

/// Request quota settings. Modeled only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct QuotaOptions {
    /// Average requests per second.
    pub average: u32,

    /// Burst capacity.
    pub burst: u32,
}

/// Partitioning settings. Modeled only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct PartitioningOptions {
    pub partition_count: u32,
    pub partition_key_extractor: Option<String>,
    pub partitioning_algorithm: Option<String>,
}

/// Load balancing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalancingOptions {
    pub mode: crate::load_balancer::LoadBalancingMode,
}

/// Health check settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckOptions {
    pub active: ActiveHealthCheckOptions,
}

/// Active (out-of-band probe) health check settings.
///
/// A running prober owns a copy of these; any change replaces the prober.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ActiveHealthCheckOptions {
    /// Enable active health checks.
    pub enabled: bool,

    /// Probe interval in milliseconds.
    pub interval_ms: u64,

    /// Per-probe timeout in milliseconds.
    pub timeout_ms: u64,

    /// Port override for probes.
    pub port: Option<u16>,

    /// Path appended to the probed address.
    pub path: String,
}

impl Default for ActiveHealthCheckOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: 15_000,
            timeout_ms: 10_000,
            port: None,
            path: String::new(),
        }
    }
}

impl ActiveHealthCheckOptions {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Endpoints of one backend, keyed and ordered by id.
pub type EndpointMap = BTreeMap<EndpointId, EndpointConfig>;

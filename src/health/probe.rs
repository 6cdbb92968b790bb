//! Single health probes: client seam, outcome classification and probe
//! address construction.

use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::Empty;
use hyper::{header, Method, Request, StatusCode};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use url::Url;

use crate::config::schema::{ActiveHealthCheckOptions, EndpointConfig};
use crate::config::validation::{parse_endpoint_address, AddressError};
use crate::health::HealthState;

const USER_AGENT: &str = "proxy-control-health-probe";

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("invalid probe request: {0}")]
    InvalidRequest(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Issues the HTTP request of one probe and returns the response status.
///
/// Timeouts and cancellation are applied by the prober around this call.
#[async_trait]
pub trait ProbeClient: Send + Sync + Debug {
    async fn get(&self, uri: &Url) -> Result<StatusCode, ProbeError>;
}

/// Probe client on the hyper connection-pooling client.
#[derive(Debug, Clone)]
pub struct HyperProbeClient {
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl HyperProbeClient {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }
}

impl Default for HyperProbeClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProbeClient for HyperProbeClient {
    async fn get(&self, uri: &Url) -> Result<StatusCode, ProbeError> {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri.as_str())
            .header(header::USER_AGENT, USER_AGENT)
            .body(Empty::<Bytes>::new())
            .map_err(|e| ProbeError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ProbeError::Transport(e.to_string()))?;

        Ok(response.status())
    }
}

/// Result of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success,
    TransportFailure,
    /// Response with a non-2xx status.
    HttpFailure(StatusCode),
    Timeout,
    /// Aborted by a prober stop. Carries no health information.
    Canceled,
}

impl ProbeOutcome {
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_success() {
            ProbeOutcome::Success
        } else {
            ProbeOutcome::HttpFailure(status)
        }
    }

    /// Health state implied by this outcome; `None` for `Canceled`.
    pub fn health(&self) -> Option<HealthState> {
        match self {
            ProbeOutcome::Success => Some(HealthState::Healthy),
            ProbeOutcome::TransportFailure
            | ProbeOutcome::HttpFailure(_)
            | ProbeOutcome::Timeout => Some(HealthState::Unhealthy),
            ProbeOutcome::Canceled => None,
        }
    }
}

/// Address probed for `endpoint`: its health address (or primary address),
/// with the port replaced by `options.port` and `options.path` appended to
/// the base path.
pub fn probe_uri(
    endpoint: &EndpointConfig,
    options: &ActiveHealthCheckOptions,
) -> Result<Url, AddressError> {
    let mut uri = parse_endpoint_address(endpoint.health_address())?;

    if let Some(port) = options.port {
        uri.set_port(Some(port))
            .map_err(|_| AddressError::MissingHost)?;
    }

    if !options.path.is_empty() {
        let path = format!("{}{}", uri.path().trim_end_matches('/'), options.path);
        uri.set_path(&path);
    }

    Ok(uri)
}

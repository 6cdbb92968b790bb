//! Creates probers with shared collaborators.

use std::sync::Arc;

use crate::config::schema::ActiveHealthCheckOptions;
use crate::health::clock::{Clock, TokioClock};
use crate::health::probe::{HyperProbeClient, ProbeClient};
use crate::health::prober::HealthProber;
use crate::load_balancer::random::{RandomFactory, ThreadRandomFactory};
use crate::runtime::EndpointManager;

/// Builds [`HealthProber`]s that share one probe client, clock and random
/// source.
#[derive(Debug, Clone)]
pub struct ProberFactory {
    client: Arc<dyn ProbeClient>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomFactory>,
}

impl ProberFactory {
    pub fn new(
        client: Arc<dyn ProbeClient>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomFactory>,
    ) -> Self {
        Self {
            client,
            clock,
            random,
        }
    }

    /// A prober in the `Created` state. The caller starts it.
    pub fn create(
        &self,
        backend_id: &str,
        options: ActiveHealthCheckOptions,
        endpoints: Arc<EndpointManager>,
    ) -> Arc<HealthProber> {
        Arc::new(HealthProber::new(
            backend_id,
            options,
            endpoints,
            Arc::clone(&self.client),
            Arc::clone(&self.clock),
            Arc::clone(&self.random),
        ))
    }
}

impl Default for ProberFactory {
    fn default() -> Self {
        Self::new(
            Arc::new(HyperProbeClient::new()),
            Arc::new(TokioClock),
            Arc::new(ThreadRandomFactory),
        )
    }
}

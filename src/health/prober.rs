//! Active health prober of one backend.
//!
//! # Responsibilities
//! - Periodically probe every endpoint of the backend
//! - Update endpoint health flags and republish the healthy subset
//! - Stop gracefully, aborting in-flight probes

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::FutureExt;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::schema::{ActiveHealthCheckOptions, BackendId};
use crate::health::clock::Clock;
use crate::health::probe::{probe_uri, ProbeClient, ProbeOutcome};
use crate::load_balancer::random::RandomFactory;
use crate::runtime::{EndpointInfo, EndpointManager};

/// Lifecycle of a prober. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProberState {
    Created,
    Running,
    Stopping,
    Stopped,
}

/// Probes the endpoints of one backend on a fixed interval.
///
/// The first cycle starts after a random delay in `[0, interval]` so that
/// probers created together do not fire together. Each following cycle
/// starts one interval after the start of the previous one.
pub struct HealthProber {
    backend_id: BackendId,
    options: ActiveHealthCheckOptions,
    endpoints: Arc<EndpointManager>,
    client: Arc<dyn ProbeClient>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomFactory>,
    state: watch::Sender<ProberState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for HealthProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HealthProber")
            .field("backend_id", &self.backend_id)
            .field("options", &self.options)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl HealthProber {
    pub fn new(
        backend_id: &str,
        options: ActiveHealthCheckOptions,
        endpoints: Arc<EndpointManager>,
        client: Arc<dyn ProbeClient>,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomFactory>,
    ) -> Self {
        let (state, _) = watch::channel(ProberState::Created);
        Self {
            backend_id: backend_id.to_string(),
            options,
            endpoints,
            client,
            clock,
            random,
            state,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    pub fn backend_id(&self) -> &str {
        &self.backend_id
    }

    /// Options this prober was created with. They never change; a change of
    /// options replaces the prober.
    pub fn options(&self) -> &ActiveHealthCheckOptions {
        &self.options
    }

    pub fn state(&self) -> ProberState {
        *self.state.borrow()
    }

    /// Start probing. Only a freshly created prober starts.
    pub fn start(self: &Arc<Self>) {
        let started = self.state.send_if_modified(|state| {
            if *state == ProberState::Created {
                *state = ProberState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            tracing::warn!(
                backend_id = %self.backend_id,
                state = ?self.state(),
                "Health prober already started or stopped"
            );
            return;
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run().await });
        *self.task.lock() = Some(handle);
    }

    /// Stop probing and wait until the loop has exited. In-flight probes
    /// are aborted and leave health untouched. Idempotent.
    pub async fn stop(&self) {
        self.request_stop();
        self.wait_stopped().await;
    }

    /// Ask the loop to exit without waiting for it. Takes effect even if the
    /// caller never awaits [`wait_stopped`](Self::wait_stopped).
    pub fn request_stop(&self) {
        self.state.send_if_modified(|state| match *state {
            ProberState::Created => {
                *state = ProberState::Stopped;
                true
            }
            ProberState::Running => {
                *state = ProberState::Stopping;
                true
            }
            ProberState::Stopping | ProberState::Stopped => false,
        });
        self.cancel.cancel();
    }

    /// Wait until the loop has exited. Only returns once a stop was
    /// requested.
    pub async fn wait_stopped(&self) {
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(
                    backend_id = %self.backend_id,
                    error = %e,
                    "Health prober task failed"
                );
                self.state.send_replace(ProberState::Stopped);
            }
        }

        let mut state = self.state.subscribe();
        let stopped = state.wait_for(|s| *s == ProberState::Stopped).await.is_ok();
        tracing::debug!(backend_id = %self.backend_id, stopped, "Health prober stopped");
    }

    async fn run(self: Arc<Self>) {
        let interval = self.options.interval();
        let initial_delay = {
            let mut rng = self.random.create();
            Duration::from_millis(rng.gen_range(0..=self.options.interval_ms))
        };

        tracing::info!(
            backend_id = %self.backend_id,
            interval_ms = self.options.interval_ms,
            timeout_ms = self.options.timeout_ms,
            path = %self.options.path,
            "Health prober starting"
        );

        let mut proceed = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = self.clock.sleep(initial_delay) => true,
        };

        while proceed {
            let cycle_start = self.clock.now();

            if let Err(panic) = AssertUnwindSafe(self.probe_cycle()).catch_unwind().await {
                tracing::error!(
                    backend_id = %self.backend_id,
                    panic = panic_message(panic.as_ref()),
                    "Health probe cycle panicked"
                );
            }

            proceed = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => false,
                _ = self.clock.sleep_until(cycle_start + interval) => true,
            };
        }

        self.state.send_replace(ProberState::Stopped);
        tracing::info!(backend_id = %self.backend_id, "Health prober exiting loop");
    }

    async fn probe_cycle(&self) {
        let state = self.endpoints.dynamic_state();
        let outcomes = join_all(
            state
                .all_endpoints
                .iter()
                .map(|endpoint| self.probe_endpoint(endpoint)),
        )
        .await;

        let mut changed = false;
        for (endpoint, outcome) in state.all_endpoints.iter().zip(outcomes) {
            let Some(health) = outcome.health() else {
                continue;
            };
            let previous = endpoint.set_health_state(health);
            if previous != health {
                changed = true;
                tracing::info!(
                    backend_id = %self.backend_id,
                    endpoint_id = %endpoint.endpoint_id(),
                    from = ?previous,
                    to = ?health,
                    outcome = ?outcome,
                    "Endpoint health changed"
                );
            }
        }

        if changed {
            self.endpoints.refresh_health();
        }
    }

    async fn probe_endpoint(&self, endpoint: &EndpointInfo) -> ProbeOutcome {
        let config = endpoint.config();
        let uri = match probe_uri(&config, &self.options) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::debug!(
                    backend_id = %self.backend_id,
                    endpoint_id = %endpoint.endpoint_id(),
                    error = %e,
                    "Cannot build health probe address"
                );
                return ProbeOutcome::TransportFailure;
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => ProbeOutcome::Canceled,
            _ = self.clock.sleep(self.options.timeout()) => ProbeOutcome::Timeout,
            result = self.client.get(&uri) => match result {
                Ok(status) => ProbeOutcome::from_status(status),
                Err(e) => {
                    tracing::debug!(
                        backend_id = %self.backend_id,
                        endpoint_id = %endpoint.endpoint_id(),
                        uri = %uri,
                        error = %e,
                        "Health probe request failed"
                    );
                    ProbeOutcome::TransportFailure
                }
            },
        };

        if !matches!(outcome, ProbeOutcome::Success | ProbeOutcome::Canceled) {
            tracing::debug!(
                backend_id = %self.backend_id,
                endpoint_id = %endpoint.endpoint_id(),
                uri = %uri,
                outcome = ?outcome,
                "Health probe failed"
            );
        }
        outcome
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::EndpointConfig;
    use crate::health::clock::TokioClock;
    use crate::health::probe::ProbeError;
    use crate::health::HealthState;
    use crate::load_balancer::SeededRandomFactory;
    use async_trait::async_trait;
    use hyper::StatusCode;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    #[derive(Debug, Clone)]
    enum Scripted {
        Status(u16),
        Fail,
        Hang,
        Panic,
    }

    /// Replies per host from a script; the last entry repeats.
    #[derive(Debug, Default)]
    struct ScriptedClient {
        scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
        calls: AtomicUsize,
        dropped: AtomicUsize,
    }

    struct DropCounter<'a>(&'a AtomicUsize);

    impl Drop for DropCounter<'_> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl ScriptedClient {
        fn new(scripts: &[(&str, Vec<Scripted>)]) -> Arc<Self> {
            let client = Self::default();
            for (host, script) in scripts {
                client
                    .scripts
                    .lock()
                    .insert(host.to_string(), script.iter().cloned().collect());
            }
            Arc::new(client)
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn next(&self, host: &str) -> Scripted {
            let mut scripts = self.scripts.lock();
            match scripts.get_mut(host) {
                Some(script) if script.len() > 1 => script.pop_front().unwrap(),
                Some(script) => script.front().cloned().unwrap_or(Scripted::Status(200)),
                None => Scripted::Status(200),
            }
        }
    }

    #[async_trait]
    impl ProbeClient for ScriptedClient {
        async fn get(&self, uri: &Url) -> Result<StatusCode, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.next(uri.host_str().unwrap_or_default()) {
                Scripted::Status(code) => Ok(StatusCode::from_u16(code).unwrap()),
                Scripted::Fail => Err(ProbeError::Transport("connection refused".into())),
                Scripted::Hang => {
                    let _guard = DropCounter(&self.dropped);
                    futures_util::future::pending::<()>().await;
                    unreachable!()
                }
                Scripted::Panic => panic!("scripted probe panic"),
            }
        }
    }

    fn endpoints(hosts: &[&str]) -> Arc<EndpointManager> {
        let manager = Arc::new(EndpointManager::new("b1"));
        for host in hosts {
            manager.get_or_create(host, || {
                Arc::new(EndpointConfig::new(format!("http://{}", host)))
            });
        }
        manager.publish();
        manager
    }

    fn prober(
        client: Arc<ScriptedClient>,
        endpoints: Arc<EndpointManager>,
        interval_ms: u64,
        timeout_ms: u64,
    ) -> Arc<HealthProber> {
        let options = ActiveHealthCheckOptions {
            enabled: true,
            interval_ms,
            timeout_ms,
            path: "/health".into(),
            ..Default::default()
        };
        Arc::new(HealthProber::new(
            "b1",
            options,
            endpoints,
            client,
            Arc::new(TokioClock),
            Arc::new(SeededRandomFactory::new(5)),
        ))
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..10_000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    fn health(endpoints: &EndpointManager, id: &str) -> HealthState {
        endpoints.try_get(id).unwrap().health_state()
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_status_drives_health() {
        let client = ScriptedClient::new(&[(
            "e1.internal",
            vec![Scripted::Status(500), Scripted::Status(500), Scripted::Status(200)],
        )]);
        let endpoints = endpoints(&["e1.internal"]);
        let prober = prober(client.clone(), endpoints.clone(), 1_000, 500);
        prober.start();
        assert_eq!(prober.state(), ProberState::Running);

        wait_until(|| client.calls() >= 1).await;
        assert_eq!(health(&endpoints, "e1.internal"), HealthState::Unhealthy);
        assert!(endpoints.dynamic_state().healthy_endpoints.is_empty());
        assert_eq!(endpoints.dynamic_state().all_endpoints.len(), 1);

        wait_until(|| client.calls() >= 2).await;
        assert_eq!(health(&endpoints, "e1.internal"), HealthState::Unhealthy);

        wait_until(|| client.calls() >= 3).await;
        assert_eq!(health(&endpoints, "e1.internal"), HealthState::Healthy);
        assert_eq!(endpoints.dynamic_state().healthy_endpoints.len(), 1);

        prober.stop().await;
        assert_eq!(prober.state(), ProberState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_healthy_endpoint_turns_unhealthy_on_failure() {
        let client = ScriptedClient::new(&[(
            "e1.internal",
            vec![Scripted::Status(200), Scripted::Status(500), Scripted::Status(200)],
        )]);
        let endpoints = endpoints(&["e1.internal"]);
        let prober = prober(client.clone(), endpoints.clone(), 1_000, 500);
        prober.start();

        wait_until(|| client.calls() >= 1).await;
        assert_eq!(health(&endpoints, "e1.internal"), HealthState::Healthy);
        assert_eq!(endpoints.dynamic_state().healthy_endpoints.len(), 1);

        wait_until(|| client.calls() >= 2).await;
        assert_eq!(health(&endpoints, "e1.internal"), HealthState::Unhealthy);
        assert!(endpoints.dynamic_state().healthy_endpoints.is_empty());
        assert_eq!(endpoints.dynamic_state().all_endpoints.len(), 1);

        wait_until(|| client.calls() >= 3).await;
        assert_eq!(health(&endpoints, "e1.internal"), HealthState::Healthy);
        assert_eq!(endpoints.dynamic_state().healthy_endpoints.len(), 1);

        prober.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_aborts_in_flight_probe() {
        let client = ScriptedClient::new(&[("e1.internal", vec![Scripted::Hang])]);
        let endpoints = endpoints(&["e1.internal"]);
        let prober = prober(client.clone(), endpoints.clone(), 30_000, 10_000);
        prober.start();

        wait_until(|| client.calls() >= 1).await;
        prober.stop().await;

        assert_eq!(prober.state(), ProberState::Stopped);
        assert_eq!(client.dropped.load(Ordering::SeqCst), 1);
        assert_eq!(health(&endpoints, "e1.internal"), HealthState::Unknown);

        // Stopping again is a no-op.
        prober.stop().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_marks_unhealthy() {
        let client = ScriptedClient::new(&[
            ("slow.internal", vec![Scripted::Hang]),
            ("fast.internal", vec![Scripted::Status(204)]),
        ]);
        let endpoints = endpoints(&["fast.internal", "slow.internal"]);
        let prober = prober(client.clone(), endpoints.clone(), 5_000, 500);
        prober.start();

        wait_until(|| health(&endpoints, "slow.internal") == HealthState::Unhealthy).await;
        assert_eq!(health(&endpoints, "fast.internal"), HealthState::Healthy);
        assert_eq!(client.dropped.load(Ordering::SeqCst), 1);

        let healthy: Vec<_> = endpoints
            .dynamic_state()
            .healthy_endpoints
            .iter()
            .map(|e| e.endpoint_id().to_string())
            .collect();
        assert_eq!(healthy, vec!["fast.internal"]);

        prober.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_marks_unhealthy() {
        let client = ScriptedClient::new(&[("e1.internal", vec![Scripted::Fail])]);
        let endpoints = endpoints(&["e1.internal"]);
        let prober = prober(client.clone(), endpoints.clone(), 1_000, 500);
        prober.start();

        wait_until(|| client.calls() >= 1).await;
        assert_eq!(health(&endpoints, "e1.internal"), HealthState::Unhealthy);
        prober.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_panic_does_not_kill_loop() {
        let client = ScriptedClient::new(&[(
            "e1.internal",
            vec![Scripted::Panic, Scripted::Status(200)],
        )]);
        let endpoints = endpoints(&["e1.internal"]);
        let prober = prober(client.clone(), endpoints.clone(), 1_000, 500);
        prober.start();

        wait_until(|| client.calls() >= 1).await;
        assert_eq!(health(&endpoints, "e1.internal"), HealthState::Unknown);
        assert_eq!(prober.state(), ProberState::Running);

        wait_until(|| client.calls() >= 2).await;
        assert_eq!(health(&endpoints, "e1.internal"), HealthState::Healthy);

        prober.stop().await;
        assert_eq!(prober.state(), ProberState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_requested_stop_completes_without_waiter() {
        let client = ScriptedClient::new(&[("e1.internal", vec![Scripted::Hang])]);
        let prober = prober(client.clone(), endpoints(&["e1.internal"]), 1_000, 10_000);
        prober.start();
        wait_until(|| client.calls() >= 1).await;

        prober.request_stop();
        assert_eq!(prober.state(), ProberState::Stopping);
        wait_until(|| prober.state() == ProberState::Stopped).await;
        assert_eq!(client.dropped.load(Ordering::SeqCst), 1);

        prober.wait_stopped().await;
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_start() {
        let client = ScriptedClient::new(&[]);
        let prober = prober(client.clone(), endpoints(&["e1.internal"]), 1_000, 500);

        prober.stop().await;
        assert_eq!(prober.state(), ProberState::Stopped);

        prober.start();
        assert_eq!(prober.state(), ProberState::Stopped);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_cycle_within_one_interval() {
        let client = ScriptedClient::new(&[]);
        let prober = prober(client.clone(), endpoints(&["e1.internal"]), 1_000, 500);
        let started = tokio::time::Instant::now();
        prober.start();

        wait_until(|| client.calls() >= 1).await;
        assert!(started.elapsed() <= Duration::from_millis(1_010));
        prober.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_follow_published_membership() {
        let client = ScriptedClient::new(&[]);
        let endpoints = endpoints(&["e1.internal"]);
        let prober = prober(client.clone(), endpoints.clone(), 1_000, 500);
        prober.start();

        wait_until(|| client.calls() >= 1).await;
        endpoints.get_or_create("e2.internal", || {
            Arc::new(EndpointConfig::new("http://e2.internal"))
        });
        endpoints.publish();

        wait_until(|| health(&endpoints, "e2.internal") == HealthState::Healthy).await;
        assert_eq!(endpoints.dynamic_state().healthy_endpoints.len(), 2);
        prober.stop().await;
    }
}

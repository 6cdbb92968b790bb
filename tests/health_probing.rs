//! Active health checking against real sockets with the hyper probe client.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use proxy_control::config::schema::{BackendConfig, EndpointConfig, EndpointMap};
use proxy_control::config::{
    CollectingErrorReporter, ConfigBuilder, ConfigManager, DefaultRouteValidator,
    InMemoryConfigRepository,
};
use proxy_control::health::{HealthState, ProberFactory, ProberState};
use proxy_control::runtime::BackendInfo;
use tokio_util::sync::CancellationToken;

mod common;

fn health_checked() -> BackendConfig {
    let mut config = BackendConfig::default();
    config.health_check.active.enabled = true;
    config.health_check.active.interval_ms = 100;
    config.health_check.active.timeout_ms = 1_000;
    config.health_check.active.path = "/health".into();
    config
}

async fn wait_for_health(backend: &BackendInfo, endpoint_id: &str, expected: HealthState) {
    let endpoint = backend.endpoints().try_get(endpoint_id).unwrap();
    for _ in 0..100 {
        if endpoint.health_state() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "endpoint {} stayed {:?}, expected {:?}",
        endpoint_id,
        endpoint.health_state(),
        expected
    );
}

async fn apply(backends: &[(&str, EndpointMap)]) -> ConfigManager {
    let repo = Arc::new(InMemoryConfigRepository::new());
    let configs: HashMap<String, BackendConfig> = backends
        .iter()
        .map(|(id, _)| (id.to_string(), health_checked()))
        .collect();
    repo.set_backends(&configs);
    for (id, endpoints) in backends {
        repo.set_endpoints(id, endpoints);
    }

    let builder = ConfigBuilder::new(
        repo.clone(),
        repo.clone(),
        repo.clone(),
        Arc::new(DefaultRouteValidator),
    );
    let manager = ConfigManager::new(builder, ProberFactory::default());
    let reporter = CollectingErrorReporter::new();
    manager
        .apply_configurations(&reporter, &CancellationToken::new())
        .await
        .unwrap();
    assert!(reporter.is_empty());
    manager
}

#[tokio::test]
async fn test_endpoint_recovers_after_failed_probe() {
    let calls = Arc::new(AtomicU32::new(0));
    let targets = Arc::new(Mutex::new(Vec::new()));
    let addr = common::start_programmable_backend({
        let calls = calls.clone();
        let targets = targets.clone();
        move |target| {
            let calls = calls.clone();
            let targets = targets.clone();
            async move {
                targets.lock().unwrap().push(target);
                if calls.fetch_add(1, Ordering::SeqCst) < 5 {
                    (500, "down".into())
                } else {
                    (200, "ok".into())
                }
            }
        }
    })
    .await;

    let mut endpoints = EndpointMap::new();
    endpoints.insert("e1".into(), EndpointConfig::new(format!("http://{}", addr)));
    let manager = apply(&[("b1", endpoints)]).await;
    let backend = manager.backends().try_get("b1").unwrap();

    wait_for_health(&backend, "e1", HealthState::Unhealthy).await;
    assert!(backend.dynamic_state().healthy_endpoints.is_empty());

    wait_for_health(&backend, "e1", HealthState::Healthy).await;
    assert_eq!(backend.dynamic_state().healthy_endpoints.len(), 1);
    assert!(targets.lock().unwrap().iter().all(|t| t == "/health"));

    let prober = backend.prober().unwrap();
    manager.shutdown().await;
    assert_eq!(prober.state(), ProberState::Stopped);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_unhealthy() {
    let healthy = common::start_programmable_backend(|_| async { (204, String::new()) }).await;
    let closed = common::closed_port().await;

    let mut endpoints = EndpointMap::new();
    endpoints.insert("up".into(), EndpointConfig::new(format!("http://{}", healthy)));
    endpoints.insert("down".into(), EndpointConfig::new(format!("http://{}", closed)));
    let manager = apply(&[("b1", endpoints)]).await;
    let backend = manager.backends().try_get("b1").unwrap();

    wait_for_health(&backend, "down", HealthState::Unhealthy).await;
    wait_for_health(&backend, "up", HealthState::Healthy).await;

    let healthy_ids: Vec<_> = backend
        .dynamic_state()
        .healthy_endpoints
        .iter()
        .map(|e| e.endpoint_id().to_string())
        .collect();
    assert_eq!(healthy_ids, vec!["up"]);

    manager.shutdown().await;
}

#[tokio::test]
async fn test_health_address_override() {
    let health = common::start_programmable_backend(|_| async { (200, "ok".into()) }).await;
    let closed = common::closed_port().await;

    let mut endpoint = EndpointConfig::new(format!("http://{}", closed));
    endpoint.health = Some(format!("http://{}", health));
    let mut endpoints = EndpointMap::new();
    endpoints.insert("e1".into(), endpoint);
    let manager = apply(&[("b1", endpoints)]).await;
    let backend = manager.backends().try_get("b1").unwrap();

    wait_for_health(&backend, "e1", HealthState::Healthy).await;
    manager.shutdown().await;
}

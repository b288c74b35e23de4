use std::sync::Arc;
use std::time::Duration;

use fanout::encode_metrics;
use fanout::push::PushDelayTaskExecuteEngine;
use fanout::push::PushRequest;
use fanout::push::PushResponse;
use fanout::push::RpcPushService;
use fanout::PushConfig;
use fanout::PushKind;
use fanout::PushMetrics;
use prometheus::Registry;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::common::rpc_push_service;
use crate::common::service;
use crate::common::FakeConnections;
use crate::common::InMemoryRegistry;

struct Harness {
    registry: Arc<InMemoryRegistry>,
    connections: Arc<FakeConnections>,
    rpc: Arc<RpcPushService>,
    engine: PushDelayTaskExecuteEngine,
    metrics: PushMetrics,
    metrics_registry: Registry,
}

fn harness() -> Harness {
    let registry = Arc::new(InMemoryRegistry::default());
    let connections = Arc::new(FakeConnections::default());
    let rpc = rpc_push_service(connections.clone());
    let metrics_registry = Registry::new_custom(Some("fanout".to_string()), None).unwrap();
    let metrics = PushMetrics::new(&metrics_registry).unwrap();
    let engine = PushDelayTaskExecuteEngine::new(
        PushConfig::default(),
        registry.clone(),
        registry.clone(),
        rpc.clone(),
        metrics.clone(),
    );
    Harness {
        registry,
        connections,
        rpc,
        engine,
        metrics,
        metrics_registry,
    }
}

#[tokio::test(start_paused = true)]
async fn test_service_change_reaches_every_subscriber_and_retries_rejection() {
    let h = harness();
    let orders = service("orders");
    for client in ["client-a", "client-b"] {
        h.registry.subscribe(&orders, client);
        h.connections.connect(client);
    }
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = h.engine.start(shutdown_rx);

    // a burst of changes is pushed once
    for _ in 0..5 {
        h.engine.notify_service_changed(orders.clone());
    }
    sleep(Duration::from_millis(700)).await;

    let mut sent = h.connections.drain();
    sent.sort_by(|a, b| a.client_id.cmp(&b.client_id));
    assert_eq!(sent.len(), 2);
    assert!(matches!(
        &sent[0].request,
        PushRequest::ServiceChanged { payload, .. } if payload.service == orders
    ));
    assert_eq!(h.rpc.pending(), 2);

    assert!(h.rpc.on_response("client-a", &sent[0].request_id, PushResponse::success()));
    assert!(h.rpc.on_response(
        "client-b",
        &sent[1].request_id,
        PushResponse {
            code: 503,
            message: "overloaded".to_string(),
        },
    ));

    // only the rejecting client is retried, after the retry delay
    sleep(Duration::from_millis(1200)).await;
    let retried = h.connections.drain();
    assert_eq!(retried.len(), 1);
    assert_eq!(retried[0].client_id, "client-b");
    h.rpc.on_response("client-b", &retried[0].request_id, PushResponse::success());

    assert_eq!(h.metrics.success_count(PushKind::Service), 2);
    assert_eq!(h.metrics.failed_count(PushKind::Service), 1);
    assert!(encode_metrics(&h.metrics_registry).contains("fanout_push_failed_total{kind=\"service\"} 1"));

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_unacknowledged_push_is_retried_after_timeout() {
    let h = harness();
    let orders = service("orders");
    h.registry.subscribe(&orders, "client-a");
    h.connections.connect("client-a");
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = h.engine.start(shutdown_rx);

    h.engine.notify_service_changed(orders.clone());
    sleep(Duration::from_millis(700)).await;
    assert_eq!(h.connections.drain().len(), 1);

    // push timeout is 5s, then the retry waits another second
    sleep(Duration::from_millis(6200)).await;

    assert_eq!(h.metrics.failed_count(PushKind::Service), 1);
    assert_eq!(h.connections.drain().len(), 1);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_closed_connection_is_not_retried() {
    let h = harness();
    let orders = service("orders");
    h.registry.subscribe(&orders, "client-a");
    h.connections.connect("client-a");
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = h.engine.start(shutdown_rx);

    h.engine.notify_subscriber(orders.clone(), "client-a");
    sleep(Duration::from_millis(700)).await;
    assert_eq!(h.connections.drain().len(), 1);

    h.connections.disconnect("client-a");
    assert_eq!(h.rpc.on_connection_closed("client-a"), 1);
    sleep(Duration::from_secs(3)).await;

    assert!(h.connections.drain().is_empty());
    assert!(h.engine.engine().is_empty());
    assert_eq!(h.metrics.failed_count(PushKind::Service), 1);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}

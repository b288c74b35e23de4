use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use fanout::fuzzy_watch::FuzzyWatchSyncNotifier;
use fanout::fuzzy_watch::FuzzyWatchSyncRequest;
use fanout::fuzzy_watch::NotifyType;
use fanout::push::PushRequest;
use fanout::push::PushResponse;
use fanout::push::RpcPushService;
use fanout::ChangeType;
use fanout::FuzzyWatchConfig;
use fanout::PushKind;
use fanout::PushMetrics;
use prometheus::Registry;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::common::rpc_push_service;
use crate::common::service;
use crate::common::FakeConnections;
use crate::common::InMemoryRegistry;
use crate::common::SentRequest;

const CLIENT: &str = "watcher-1";
const PATTERN: &str = "public>>DEFAULT_GROUP@@order*";

fn sync_of(sent: &SentRequest) -> &FuzzyWatchSyncRequest {
    match &sent.request {
        PushRequest::FuzzyWatchSync(sync) => sync,
        other => panic!("unexpected request {other:?}"),
    }
}

fn ack_all(
    rpc: &RpcPushService,
    sent: &[SentRequest],
) {
    for request in sent {
        assert!(rpc.on_response(&request.client_id, &request.request_id, PushResponse::success()));
    }
}

fn setup(
    config: FuzzyWatchConfig,
) -> (
    Arc<InMemoryRegistry>,
    Arc<FakeConnections>,
    Arc<RpcPushService>,
    FuzzyWatchSyncNotifier,
    PushMetrics,
) {
    let registry = Arc::new(InMemoryRegistry::default());
    let connections = Arc::new(FakeConnections::default());
    connections.connect(CLIENT);
    let rpc = rpc_push_service(connections.clone());
    let metrics = PushMetrics::new(&Registry::new()).unwrap();
    let notifier = FuzzyWatchSyncNotifier::new(config, registry.clone(), rpc.clone(), metrics.clone());
    (registry, connections, rpc, notifier, metrics)
}

#[tokio::test(start_paused = true)]
async fn test_init_sync_in_batches_then_finish() {
    let (registry, connections, rpc, notifier, metrics) = setup(FuzzyWatchConfig {
        batch_size: 2,
        ..Default::default()
    });
    for name in ["orders", "order-archive", "order-audit", "order-legacy", "order-v2"] {
        registry.register_service(service(name));
    }
    registry.register_service(service("payments"));
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = notifier.start(shutdown_rx);

    assert_eq!(notifier.on_fuzzy_watch(CLIENT, PATTERN, &BTreeSet::new(), true).unwrap(), 3);
    sleep(Duration::from_millis(300)).await;

    let batches = connections.drain();
    assert_eq!(batches.len(), 3);
    let mut positions: Vec<_> = batches.iter().map(|s| sync_of(s).current_batch).collect();
    positions.sort();
    assert_eq!(positions, vec![1, 2, 3]);
    let synced: usize = batches.iter().map(|s| sync_of(s).contexts.len()).sum();
    assert_eq!(synced, 5);
    assert!(batches
        .iter()
        .flat_map(|s| sync_of(s).contexts.iter())
        .all(|c| c.change_type == ChangeType::Add));

    // no finish until every batch is acknowledged
    ack_all(&rpc, &batches[..2]);
    sleep(Duration::from_millis(300)).await;
    assert!(connections.drain().is_empty());

    ack_all(&rpc, &batches[2..]);
    sleep(Duration::from_millis(300)).await;
    let finish = connections.drain();
    assert_eq!(finish.len(), 1);
    assert_eq!(sync_of(&finish[0]).notify_type, NotifyType::FinishInitNotify);
    ack_all(&rpc, &finish);

    assert_eq!(metrics.success_count(PushKind::FuzzyWatch), 4);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_new_matching_service_reaches_watcher() {
    let (registry, connections, rpc, notifier, _metrics) = setup(FuzzyWatchConfig::default());
    registry.fuzzy_watch(PATTERN, CLIENT).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = notifier.start(shutdown_rx);

    registry.register_service(service("orders"));
    assert_eq!(notifier.on_service_changed(&service("orders"), ChangeType::Add), 1);
    assert_eq!(notifier.on_service_changed(&service("payments"), ChangeType::Add), 0);
    sleep(Duration::from_millis(300)).await;

    let sent = connections.drain();
    assert_eq!(sent.len(), 1);
    let sync = sync_of(&sent[0]);
    assert_eq!(sync.notify_type, NotifyType::DiffSyncNotify);
    assert_eq!(sync.contexts.len(), 1);
    assert_eq!(sync.contexts[0].service, service("orders"));
    ack_all(&rpc, &sent);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_failed_sync_is_redelivered() {
    let (registry, connections, rpc, notifier, metrics) = setup(FuzzyWatchConfig::default());
    registry.register_service(service("orders"));
    let (shutdown_tx, shutdown_rx) = watch::channel(());
    let handle = notifier.start(shutdown_rx);

    notifier.on_fuzzy_watch(CLIENT, PATTERN, &BTreeSet::new(), false).unwrap();
    sleep(Duration::from_millis(300)).await;
    let first = connections.drain();
    assert_eq!(first.len(), 1);
    rpc.on_response(
        CLIENT,
        &first[0].request_id,
        PushResponse {
            code: 500,
            message: "busy".to_string(),
        },
    );

    sleep(Duration::from_millis(1200)).await;
    let second = connections.drain();
    assert_eq!(second.len(), 1);
    assert_eq!(sync_of(&second[0]), sync_of(&first[0]));
    assert_ne!(second[0].request_id, first[0].request_id);
    assert_eq!(metrics.failed_count(PushKind::FuzzyWatch), 1);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();
}

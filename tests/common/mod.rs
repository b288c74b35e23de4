use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use fanout::fuzzy_watch::FuzzyGroupKeyPattern;
use fanout::fuzzy_watch::FuzzyWatchIndex;
use fanout::push::Connection;
use fanout::push::ConnectionManager;
use fanout::push::PushPayload;
use fanout::push::PushRequest;
use fanout::push::RpcPushService;
use fanout::push::ServiceStorage;
use fanout::push::SubscriberIndex;
use fanout::remote::TokioTimeoutScheduler;
use fanout::Error;
use fanout::Result;
use fanout::ServiceKey;
use fanout::Subscriber;
use parking_lot::Mutex;

pub fn service(name: &str) -> ServiceKey {
    ServiceKey::new("public", "DEFAULT_GROUP", name)
}

/// In-memory registry standing in for the naming data store.
#[derive(Default)]
pub struct InMemoryRegistry {
    subscribers: Mutex<HashMap<ServiceKey, Vec<Subscriber>>>,
    services: Mutex<BTreeSet<ServiceKey>>,
    fuzzy_watchers: Mutex<Vec<(FuzzyGroupKeyPattern, Vec<String>)>>,
    revision: AtomicU64,
}

impl InMemoryRegistry {
    pub fn subscribe(
        &self,
        service: &ServiceKey,
        client_id: &str,
    ) {
        self.services.lock().insert(service.clone());
        self.subscribers
            .lock()
            .entry(service.clone())
            .or_default()
            .push(Subscriber::new(client_id));
    }

    pub fn register_service(
        &self,
        service: ServiceKey,
    ) {
        self.services.lock().insert(service);
        self.revision.fetch_add(1, Ordering::SeqCst);
    }

    pub fn fuzzy_watch(
        &self,
        pattern: &str,
        client_id: &str,
    ) -> Result<()> {
        let pattern = FuzzyGroupKeyPattern::parse(pattern)?;
        self.fuzzy_watchers.lock().push((pattern, vec![client_id.to_string()]));
        Ok(())
    }
}

impl SubscriberIndex for InMemoryRegistry {
    fn subscribers_for_service(
        &self,
        service: &ServiceKey,
    ) -> Result<Vec<Subscriber>> {
        Ok(self.subscribers.lock().get(service).cloned().unwrap_or_default())
    }
}

impl ServiceStorage for InMemoryRegistry {
    fn push_payload(
        &self,
        service: &ServiceKey,
    ) -> Result<PushPayload> {
        if !self.services.lock().contains(service) {
            return Err(Error::Fatal(format!("unknown service {service}")));
        }
        Ok(PushPayload {
            service: service.clone(),
            revision: self.revision.load(Ordering::SeqCst),
            body: service.to_string().into_bytes(),
        })
    }
}

impl FuzzyWatchIndex for InMemoryRegistry {
    fn matched_service_keys(
        &self,
        pattern: &FuzzyGroupKeyPattern,
    ) -> Result<BTreeSet<ServiceKey>> {
        Ok(self
            .services
            .lock()
            .iter()
            .filter(|s| pattern.matches(s))
            .cloned()
            .collect())
    }

    fn watchers_by_pattern(&self) -> Vec<(FuzzyGroupKeyPattern, Vec<String>)> {
        self.fuzzy_watchers.lock().clone()
    }
}

/// Request written to a client connection.
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub client_id: String,
    pub request_id: String,
    pub request: PushRequest,
}

pub type Outbox = Arc<Mutex<Vec<SentRequest>>>;

struct RecordingConnection {
    client_id: String,
    outbox: Outbox,
}

impl Connection for RecordingConnection {
    fn send(
        &self,
        request_id: &str,
        request: PushRequest,
    ) -> std::result::Result<(), fanout::PushError> {
        self.outbox.lock().push(SentRequest {
            client_id: self.client_id.clone(),
            request_id: request_id.to_string(),
            request,
        });
        Ok(())
    }
}

/// Connections of the clients in `online`; every write lands in the
/// shared outbox.
#[derive(Default)]
pub struct FakeConnections {
    online: Mutex<HashSet<String>>,
    pub outbox: Outbox,
}

impl FakeConnections {
    pub fn connect(
        &self,
        client_id: &str,
    ) {
        self.online.lock().insert(client_id.to_string());
    }

    pub fn disconnect(
        &self,
        client_id: &str,
    ) {
        self.online.lock().remove(client_id);
    }

    /// Removes and returns everything written so far.
    pub fn drain(&self) -> Vec<SentRequest> {
        self.outbox.lock().drain(..).collect()
    }
}

impl ConnectionManager for FakeConnections {
    fn get_connection(
        &self,
        client_id: &str,
    ) -> Option<Arc<dyn Connection>> {
        if !self.online.lock().contains(client_id) {
            return None;
        }
        Some(Arc::new(RecordingConnection {
            client_id: client_id.to_string(),
            outbox: self.outbox.clone(),
        }))
    }
}

pub fn rpc_push_service(connections: Arc<FakeConnections>) -> Arc<RpcPushService> {
    Arc::new(RpcPushService::new(
        connections,
        Arc::new(TokioTimeoutScheduler::current()),
        Duration::from_secs(3),
    ))
}

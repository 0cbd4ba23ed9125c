//! End-to-end handshake flows over the in-process components

use async_trait::async_trait;
use handshake_daemon::config::{ServerConfig, SessionConfig, WatcherConfig};
use handshake_daemon::gateway::PlainCode;
use handshake_daemon::storage::StorageResult;
use handshake_daemon::wallet::{CredentialExchange, LocalWallet};
use handshake_daemon::{
    CallbackReceiver, Channel, ChangeWatcher, Gateway, InMemoryStore, KvStore, SessionStore,
    SubscriptionRegistry,
};
use handshake_types::{
    ClaimSet, CredentialRequirement, GatewayMessage, SessionId, SessionRecord, UserData,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

const POLL: Duration = Duration::from_millis(500);

/// In-memory store that records reads per key
#[derive(Default)]
struct ObservedStore {
    inner: InMemoryStore,
    reads: Mutex<HashMap<String, usize>>,
}

impl ObservedStore {
    fn reads(&self, key: &str) -> usize {
        self.reads.lock().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl KvStore for ObservedStore {
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> StorageResult<()> {
        self.inner.put(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        *self.reads.lock().entry(key.to_string()).or_insert(0) += 1;
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.inner.delete(key).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Option<Duration>,
    ) -> StorageResult<bool> {
        self.inner.compare_and_swap(key, expected, new, ttl).await
    }
}

struct Daemon {
    kv: Arc<ObservedStore>,
    wallet: Arc<LocalWallet>,
    watcher: Arc<ChangeWatcher>,
    gateway: Arc<Gateway>,
    receiver: CallbackReceiver,
    _shutdown: watch::Sender<bool>,
}

fn start() -> Daemon {
    let kv = Arc::new(ObservedStore::default());
    let store = SessionStore::new(kv.clone(), 0);
    let wallet = Arc::new(LocalWallet::new("integration-seed", "did:local:svc"));
    let exchange: Arc<dyn CredentialExchange> = wallet.clone();

    let config = WatcherConfig {
        poll_interval_ms: POLL.as_millis() as u64,
        max_wait_secs: 5,
        max_concurrent_polls: 8,
    };
    let (watcher, events) = ChangeWatcher::new(config, store.clone());
    let registry = SubscriptionRegistry::new(watcher.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(watcher.clone().run(shutdown_rx.clone()));
    tokio::spawn(registry.clone().dispatch(events, shutdown_rx));

    let gateway = Arc::new(Gateway::new(
        store.clone(),
        exchange.clone(),
        registry,
        Arc::new(PlainCode),
        ServerConfig::default(),
        SessionConfig::default(),
        CredentialRequirement::defaults(),
    ));
    let receiver = CallbackReceiver::new(store, exchange, SessionConfig::default());

    Daemon {
        kv,
        wallet,
        watcher,
        gateway,
        receiver,
        _shutdown: shutdown_tx,
    }
}

fn id(s: &str) -> SessionId {
    SessionId::new(s).unwrap()
}

fn open(daemon: &Daemon, session: &str) -> mpsc::Receiver<GatewayMessage> {
    let (channel, outbox) = Channel::new(session, 8);
    let gateway = daemon.gateway.clone();
    let session = id(session);
    tokio::spawn(async move { gateway.run_handshake(&session, &channel).await });
    outbox
}

#[tokio::test(start_paused = true)]
async fn session_success_reaches_waiting_channel() {
    let daemon = start();
    let mut outbox = open(&daemon, "abc123");

    let Some(GatewayMessage::Pending { token, .. }) = outbox.recv().await else {
        panic!("expected pending message");
    };

    let stored: SessionRecord =
        serde_json::from_str(&daemon.kv.get("abc123").await.unwrap().unwrap()).unwrap();
    assert_eq!(stored, SessionRecord::pending(token.clone()));

    let response = daemon
        .wallet
        .respond(&token, "did:x:1", ClaimSet::new().with("givenName", "Ann"))
        .unwrap();
    daemon.receiver.submit(&id("abc123"), &response).await.unwrap();
    let submitted = Instant::now();

    let message = outbox.recv().await.unwrap();
    assert!(submitted.elapsed() <= POLL);
    assert_eq!(
        serde_json::to_value(&message).unwrap(),
        serde_json::json!({"status": "success", "data": {"did": "did:x:1", "firstName": "Ann"}})
    );

    assert_eq!(outbox.recv().await, None);
    assert!(!daemon.watcher.is_watching(&id("abc123")));
    assert!(daemon.kv.get("abc123").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn disconnected_channel_stops_polling() {
    let daemon = start();
    let outbox = open(&daemon, "xyz");

    tokio::time::sleep(POLL * 2).await;
    assert!(daemon.watcher.is_watching(&id("xyz")));
    assert!(daemon.kv.reads("xyz") >= 1);

    drop(outbox);
    tokio::time::sleep(POLL).await;
    assert!(!daemon.watcher.is_watching(&id("xyz")));

    let reads = daemon.kv.reads("xyz");
    tokio::time::sleep(POLL * 4).await;
    assert_eq!(daemon.kv.reads("xyz"), reads);
}

#[tokio::test(start_paused = true)]
async fn unanswered_session_times_out() {
    let daemon = start();
    let mut outbox = open(&daemon, "slow");

    assert!(matches!(
        outbox.recv().await,
        Some(GatewayMessage::Pending { .. })
    ));

    let message = outbox.recv().await.unwrap();
    assert_eq!(
        message,
        GatewayMessage::Timeout {
            session_id: id("slow")
        }
    );
    assert_eq!(outbox.recv().await, None);
    assert_eq!(daemon.watcher.watching(), 0);
    assert!(daemon.kv.get("slow").await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn every_session_gets_exactly_one_terminal_message() {
    let daemon = start();
    let sessions: Vec<String> = (0..12).map(|i| format!("s{}", i)).collect();
    let mut outboxes: Vec<_> = sessions.iter().map(|s| open(&daemon, s)).collect();

    let mut tokens = Vec::new();
    for outbox in &mut outboxes {
        let Some(GatewayMessage::Pending { token, .. }) = outbox.recv().await else {
            panic!("expected pending message");
        };
        tokens.push(token);
    }

    // Answer the even sessions, let the odd ones run out
    for (i, (session, token)) in sessions.iter().zip(&tokens).enumerate() {
        if i % 2 == 0 {
            let did = format!("did:x:{}", i);
            let response = daemon.wallet.respond(token, &did, ClaimSet::new()).unwrap();
            daemon.receiver.submit(&id(session), &response).await.unwrap();
        }
    }

    for (i, outbox) in outboxes.iter_mut().enumerate() {
        let message = outbox.recv().await.unwrap();
        if i % 2 == 0 {
            let expected = UserData {
                did: format!("did:x:{}", i),
                first_name: None,
                last_name: None,
                email_address: None,
            };
            assert_eq!(message, GatewayMessage::Success { data: expected.into() });
        } else {
            assert!(matches!(message, GatewayMessage::Timeout { .. }));
        }
        assert_eq!(outbox.recv().await, None);
    }

    assert_eq!(daemon.watcher.watching(), 0);
}

//! Polling loop that turns store transitions into terminal events

use crate::config::WatcherConfig;
use crate::storage::SessionStore;
use futures_util::stream::{self, StreamExt};
use handshake_types::{SessionId, TerminalEvent};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Instant, MissedTickBehavior};

/// Watches subscribed session ids for their terminal transition.
///
/// Each tick snapshots the subscription set under the lock, then reads every
/// id from the store without holding it. An id added after the snapshot is
/// read on the next tick. Removal from the set is the commit point for an
/// event: whoever removes the id raises (or suppresses) its single event.
pub struct ChangeWatcher {
    config: WatcherConfig,
    store: SessionStore,
    watched: Mutex<HashMap<SessionId, Instant>>,
    event_tx: mpsc::UnboundedSender<TerminalEvent>,
}

impl ChangeWatcher {
    /// Create a new watcher and the receiving end of its terminal events
    pub fn new(
        config: WatcherConfig,
        store: SessionStore,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<TerminalEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let watcher = Arc::new(Self {
            config,
            store,
            watched: Mutex::new(HashMap::new()),
            event_tx,
        });

        (watcher, event_rx)
    }

    /// Start watching `id`; returns false if it was already watched
    pub fn add_subscription(&self, id: &SessionId) -> bool {
        let mut watched = self.watched.lock();
        if watched.contains_key(id) {
            return false;
        }
        watched.insert(id.clone(), Instant::now());
        tracing::debug!(session_id = %id, "Watching session");
        true
    }

    /// Stop watching `id` without raising an event
    pub fn remove_subscription(&self, id: &SessionId) -> bool {
        let removed = self.watched.lock().remove(id).is_some();
        if removed {
            tracing::debug!(session_id = %id, "Stopped watching session");
        }
        removed
    }

    pub fn is_watching(&self, id: &SessionId) -> bool {
        self.watched.lock().contains_key(id)
    }

    /// Number of ids currently polled
    pub fn watching(&self) -> usize {
        self.watched.lock().len()
    }

    /// Poll until shutdown is signalled
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_wait_secs = self.config.max_wait_secs,
            "Change watcher started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick().await,
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("Change watcher stopped");
    }

    /// One scan over the subscription set
    pub async fn tick(&self) {
        let snapshot: Vec<(SessionId, Instant)> = self
            .watched
            .lock()
            .iter()
            .map(|(id, since)| (id.clone(), *since))
            .collect();

        let limit = self.config.max_concurrent_polls.max(1);
        stream::iter(snapshot)
            .for_each_concurrent(limit, |(id, since)| self.poll(id, since))
            .await;
    }

    async fn poll(&self, id: SessionId, since: Instant) {
        match self.store.peek(&id).await {
            Ok(Some(record)) if record.is_terminal() => {
                if self.watched.lock().remove(&id).is_some() {
                    tracing::info!(session_id = %id, "Session reached success");
                    self.emit(TerminalEvent::success(id, record));
                }
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "Session poll failed, retrying next tick");
            }
        }

        if since.elapsed() < self.config.max_wait() {
            return;
        }

        // Only time out the watch this scan saw; a re-subscription gets a fresh window
        let timed_out = {
            let mut watched = self.watched.lock();
            match watched.get(&id) {
                Some(current) if *current == since => watched.remove(&id).is_some(),
                _ => false,
            }
        };

        if timed_out {
            tracing::info!(session_id = %id, "Session timed out");
            self.emit(TerminalEvent::timeout(id));
        }
    }

    fn emit(&self, event: TerminalEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::warn!("Terminal event dropped, no dispatcher running");
        }
    }
}

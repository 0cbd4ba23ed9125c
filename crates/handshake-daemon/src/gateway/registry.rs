//! Session id → waiting listeners

use crate::watcher::ChangeWatcher;
use handshake_types::{SessionId, TerminalEvent};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

struct Listener {
    id: u64,
    tx: oneshot::Sender<TerminalEvent>,
}

/// Process-local map from session id to one-shot listeners.
///
/// An id is watched while at least one listener is registered for it. Lock
/// order is registry first, watcher second. Once closed, the registry
/// accepts no listeners and every pending `recv` resolves to `None`.
pub struct SubscriptionRegistry {
    watcher: Arc<ChangeWatcher>,
    listeners: Mutex<HashMap<SessionId, Vec<Listener>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl SubscriptionRegistry {
    pub fn new(watcher: Arc<ChangeWatcher>) -> Arc<Self> {
        Arc::new(Self {
            watcher,
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        })
    }

    /// Register interest in the terminal event of `session_id`
    pub fn subscribe(self: &Arc<Self>, session_id: &SessionId) -> Subscription {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        {
            let mut listeners = self.listeners.lock();
            if self.closed.load(Ordering::Acquire) {
                // Dropping `tx` here makes the subscription resolve at once
                tracing::debug!(session_id = %session_id, "Registry closed, subscription refused");
                drop(tx);
            } else {
                listeners
                    .entry(session_id.clone())
                    .or_default()
                    .push(Listener { id, tx });
                self.watcher.add_subscription(session_id);
                tracing::debug!(session_id = %session_id, listener = id, "Subscribed");
            }
        }

        Subscription {
            session_id: session_id.clone(),
            listener_id: id,
            rx,
            registry: Arc::clone(self),
        }
    }

    /// Hand `event` to every listener of its session; returns how many got it
    pub fn deliver(&self, event: TerminalEvent) -> usize {
        let listeners = self
            .listeners
            .lock()
            .remove(&event.session_id)
            .unwrap_or_default();

        let mut delivered = 0;
        for listener in listeners {
            if listener.tx.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }

        if delivered == 0 {
            tracing::debug!(session_id = %event.session_id, "Terminal event had no listeners");
        }
        delivered
    }

    /// Number of listeners waiting on `session_id`
    pub fn listeners(&self, session_id: &SessionId) -> usize {
        self.listeners
            .lock()
            .get(session_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Number of sessions with at least one listener
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Cancel every listener and refuse new ones; returns how many were cancelled
    pub fn close_all(&self) -> usize {
        let drained: Vec<(SessionId, Vec<Listener>)> = {
            let mut listeners = self.listeners.lock();
            self.closed.store(true, Ordering::Release);
            let drained: Vec<_> = listeners.drain().collect();
            for (session_id, _) in &drained {
                self.watcher.remove_subscription(session_id);
            }
            drained
        };

        let cancelled = drained.iter().map(|(_, list)| list.len()).sum();
        if cancelled > 0 {
            tracing::info!(cancelled, sessions = drained.len(), "Listeners cancelled");
        }
        cancelled
    }

    fn release(&self, session_id: &SessionId, listener_id: u64) {
        let mut listeners = self.listeners.lock();

        let remaining = match listeners.get_mut(session_id) {
            Some(list) => {
                list.retain(|l| l.id != listener_id);
                list.len()
            }
            None => 0,
        };

        if remaining == 0 {
            listeners.remove(session_id);
            self.watcher.remove_subscription(session_id);
        }
    }

    /// Forward watcher events to listeners until shutdown
    pub async fn dispatch(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<TerminalEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => {
                        self.deliver(event);
                    }
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        tracing::debug!("Event dispatcher stopped");
    }
}

/// Interest in one session's terminal event.
///
/// Dropping it unregisters the listener; the last listener of a session also
/// stops the watcher from polling it.
pub struct Subscription {
    session_id: SessionId,
    listener_id: u64,
    rx: oneshot::Receiver<TerminalEvent>,
    registry: Arc<SubscriptionRegistry>,
}

impl Subscription {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Wait for the terminal event; `None` if the registry was closed first
    pub async fn recv(&mut self) -> Option<TerminalEvent> {
        (&mut self.rx).await.ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.release(&self.session_id, self.listener_id);
    }
}

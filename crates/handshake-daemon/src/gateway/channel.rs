//! Outbound half of a realtime connection

use handshake_types::GatewayMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Sending side of one live connection.
///
/// At most one terminal message goes through a channel. Anything offered
/// after that, or after the peer went away, is dropped.
#[derive(Debug)]
pub struct Channel {
    label: String,
    tx: mpsc::Sender<GatewayMessage>,
    terminated: AtomicBool,
}

impl Channel {
    /// Create a channel and the outbox the connection writer drains
    pub fn new(
        label: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<GatewayMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let channel = Self {
            label: label.into(),
            tx,
            terminated: AtomicBool::new(false),
        };
        (channel, rx)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Queue a message; returns whether it was accepted
    pub async fn send(&self, message: GatewayMessage) -> bool {
        if message.is_terminal() {
            if self.terminated.swap(true, Ordering::AcqRel) {
                tracing::debug!(channel = %self.label, "Dropping second terminal message");
                return false;
            }
        } else if self.terminated.load(Ordering::Acquire) {
            tracing::debug!(channel = %self.label, "Dropping message after terminal");
            return false;
        }

        if self.tx.send(message).await.is_err() {
            tracing::debug!(channel = %self.label, "Peer gone, message dropped");
            return false;
        }
        true
    }

    /// Whether a terminal message has been sent
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Resolves once the connection writer has gone away
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

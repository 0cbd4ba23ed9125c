//! Code issuance and terminal delivery

use super::channel::Channel;
use super::code::CodeRenderer;
use super::registry::{Subscription, SubscriptionRegistry};
use crate::config::{ServerConfig, SessionConfig};
use crate::error::{HandshakeError, HandshakeResult};
use crate::storage::SessionStore;
use crate::wallet::CredentialExchange;
use handshake_types::{
    CredentialRequirement, ErrorCode, GatewayMessage, SessionId, TerminalEvent, TerminalOutcome,
};
use std::sync::Arc;

/// Realtime side of the handshake.
///
/// Mints codes through the wallet, persists the pending session, and turns
/// the terminal event of a session into exactly one message on each channel
/// waiting for it.
pub struct Gateway {
    store: SessionStore,
    wallet: Arc<dyn CredentialExchange>,
    registry: Arc<SubscriptionRegistry>,
    renderer: Arc<dyn CodeRenderer>,
    server: ServerConfig,
    session: SessionConfig,
    requirements: Vec<CredentialRequirement>,
}

impl Gateway {
    pub fn new(
        store: SessionStore,
        wallet: Arc<dyn CredentialExchange>,
        registry: Arc<SubscriptionRegistry>,
        renderer: Arc<dyn CodeRenderer>,
        server: ServerConfig,
        session: SessionConfig,
        requirements: Vec<CredentialRequirement>,
    ) -> Self {
        Self {
            store,
            wallet,
            registry,
            renderer,
            server,
            session,
            requirements,
        }
    }

    pub fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }

    /// Mint a credential request for `session_id` and store it as pending
    pub async fn issue_auth_code(&self, session_id: &SessionId) -> HandshakeResult<GatewayMessage> {
        let callback = self.server.authentication_callback(session_id.as_str());
        let request = self
            .wallet
            .create_auth_request(&callback, &self.requirements)
            .await?;

        self.store
            .create_pending(session_id, &request.encoded, self.session.pending_ttl())
            .await?;

        tracing::info!(session_id = %session_id, "Auth code issued");

        Ok(GatewayMessage::Pending {
            session_id: session_id.clone(),
            code: self.renderer.render(&request.encoded),
            token: request.encoded,
        })
    }

    /// Remember the answer given by `did` and mint a credential offer for it
    pub async fn issue_offer_code(&self, did: &str, answer: &str) -> HandshakeResult<GatewayMessage> {
        if did.is_empty() {
            return Err(HandshakeError::Malformed("did must not be empty".to_string()));
        }

        self.store
            .put_answer(did, answer, self.session.answer_ttl())
            .await?;

        let offer = self
            .wallet
            .create_credential_offer(&self.server.credential_receive_callback())
            .await?;

        tracing::info!(did, "Offer code issued");

        Ok(GatewayMessage::Offer {
            code: self.renderer.render(&offer),
            token: offer,
        })
    }

    /// Issue a code, deliver it, then wait for the session's terminal message
    pub async fn run_handshake(&self, session_id: &SessionId, channel: &Channel) {
        // The pending record must replace any leftover result before the id is
        // watched. A completion racing the subscribe stays stored until delivered.
        let pending = match self.issue_auth_code(session_id).await {
            Ok(pending) => pending,
            Err(e) => {
                Self::fail(channel, e).await;
                return;
            }
        };

        let subscription = self.registry.subscribe(session_id);
        channel.send(pending).await;
        self.await_terminal(subscription, channel).await;
    }

    /// Issue a code and deliver it; the result is collected on another channel
    pub async fn send_auth_code(&self, session_id: &SessionId, channel: &Channel) {
        match self.issue_auth_code(session_id).await {
            Ok(pending) => {
                channel.send(pending).await;
            }
            Err(e) => Self::fail(channel, e).await,
        }
    }

    /// Wait for the terminal message of a session someone else started
    pub async fn await_status(&self, session_id: &SessionId, channel: &Channel) {
        let subscription = self.registry.subscribe(session_id);
        self.await_terminal(subscription, channel).await;
    }

    pub async fn send_offer_code(&self, did: &str, answer: &str, channel: &Channel) {
        match self.issue_offer_code(did, answer).await {
            Ok(offer) => {
                channel.send(offer).await;
            }
            Err(e) => Self::fail(channel, e).await,
        }
    }

    async fn await_terminal(&self, mut subscription: Subscription, channel: &Channel) {
        let session_id = subscription.session_id().clone();

        let event = tokio::select! {
            event = subscription.recv() => event,
            _ = channel.closed() => {
                tracing::debug!(session_id = %session_id, "Channel closed before terminal event");
                return;
            }
        };
        drop(subscription);

        match event {
            Some(event) => self.deliver(event, channel).await,
            None => {
                channel
                    .send(GatewayMessage::error(
                        ErrorCode::Internal,
                        "service shutting down",
                    ))
                    .await;
            }
        }
    }

    async fn deliver(&self, event: TerminalEvent, channel: &Channel) {
        let session_id = event.session_id;

        let message = match event.outcome {
            TerminalOutcome::Success(record) => match record.data {
                Some(data) => GatewayMessage::Success { data },
                None => {
                    tracing::error!(session_id = %session_id, "Successful session carries no data");
                    GatewayMessage::error(ErrorCode::Internal, "session completed without data")
                }
            },
            TerminalOutcome::Timeout => GatewayMessage::Timeout {
                session_id: session_id.clone(),
            },
        };

        if channel.send(message).await {
            tracing::info!(session_id = %session_id, "Terminal message delivered");
        }

        if let Err(e) = self.store.remove(&session_id).await {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to remove delivered session");
        }
    }

    async fn fail(channel: &Channel, error: HandshakeError) {
        tracing::warn!(channel = %channel.label(), error = %error, "Handshake failed");
        channel
            .send(GatewayMessage::error(error.channel_code(), error.to_string()))
            .await;
    }
}

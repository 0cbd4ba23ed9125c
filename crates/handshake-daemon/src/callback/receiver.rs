use crate::config::SessionConfig;
use crate::error::{HandshakeError, HandshakeResult};
use crate::storage::SessionStore;
use crate::wallet::{CredentialExchange, CredentialMetadata};
use handshake_types::{ClaimSet, SessionId, UserData};
use std::sync::Arc;

const TINKERER_NOTE: &str = "Thank you for your participation and contribution to our ongoing \
                             efforts to make self sovereign identity a reality";

/// Accepts device submissions and records their outcome
pub struct CallbackReceiver {
    store: SessionStore,
    wallet: Arc<dyn CredentialExchange>,
    session: SessionConfig,
}

impl CallbackReceiver {
    pub fn new(store: SessionStore, wallet: Arc<dyn CredentialExchange>, session: SessionConfig) -> Self {
        Self {
            store,
            wallet,
            session,
        }
    }

    /// Validate a credential response for `session_id` and mark the session successful.
    ///
    /// A response that fails validation leaves the stored session untouched.
    pub async fn submit(&self, session_id: &SessionId, token: &str) -> HandshakeResult<UserData> {
        let current = self
            .store
            .load_versioned(session_id)
            .await?
            .ok_or_else(|| HandshakeError::SessionNotFound(session_id.to_string()))?;

        if current.record.is_terminal() {
            return Err(HandshakeError::AlreadyCompleted(session_id.to_string()));
        }

        let request = current
            .record
            .request
            .as_deref()
            .ok_or_else(|| HandshakeError::Malformed("pending session has no request".to_string()))?;

        let verified = self
            .wallet
            .validate_response(token, request)
            .await
            .map_err(|e| {
                tracing::info!(session_id = %session_id, error = %e, "Credential response rejected");
                HandshakeError::from(e)
            })?;

        let data = UserData::from_claims(&verified.claims, verified.issuer_did);
        self.store
            .complete(session_id, &current, data.clone(), self.session.result_ttl())
            .await?;

        tracing::info!(session_id = %session_id, did = %data.did, "Credential response accepted");
        Ok(data)
    }

    /// Validate an offer response and sign a credential for the responder
    pub async fn receive_offer(&self, token: &str) -> HandshakeResult<String> {
        let subject = self.wallet.validate_offer_response(token).await?;

        let claim = ClaimSet::new().with("note", TINKERER_NOTE);
        let credential = self
            .wallet
            .issue_credential(&subject, claim, CredentialMetadata::tinkerer())
            .await?;

        tracing::info!(did = %subject, "Credential issued");
        Ok(credential)
    }
}

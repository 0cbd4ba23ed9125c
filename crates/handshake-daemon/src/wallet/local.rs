//! In-process identity wallet
//!
//! Tokens are `base64url(payload).base64url(mac)` where the MAC is a blake3
//! keyed hash under a key derived from the configured seed. Every party that
//! mints tokens must share the seed, which makes this wallet suitable for
//! development and for simulating the mobile device in tests only.

use super::traits::*;
use crate::error::WalletError;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use handshake_types::{ClaimSet, CredentialRequirement};
use serde::{Deserialize, Serialize};

const KEY_CONTEXT: &str = "handshake local wallet 2024-01 token mac";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "typ", rename_all = "camelCase")]
enum Payload {
    #[serde(rename_all = "camelCase")]
    CredentialRequest {
        iss: String,
        nonce: String,
        callback_url: String,
        requirements: Vec<CredentialRequirement>,
        iat: i64,
    },
    #[serde(rename_all = "camelCase")]
    CredentialOffer {
        iss: String,
        nonce: String,
        callback_url: String,
        iat: i64,
    },
    #[serde(rename_all = "camelCase")]
    CredentialResponse {
        iss: String,
        request_nonce: String,
        credential_types: Vec<String>,
        claims: ClaimSet,
    },
    #[serde(rename_all = "camelCase")]
    CredentialOfferResponse { iss: String, offer_nonce: String },
    #[serde(rename_all = "camelCase")]
    SignedCredential {
        iss: String,
        sub: String,
        claim: ClaimSet,
        metadata: CredentialMetadata,
        iat: i64,
    },
}

/// Signing wallet that lives inside the daemon
#[derive(Clone)]
pub struct LocalWallet {
    did: String,
    key: [u8; 32],
}

impl std::fmt::Debug for LocalWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalWallet").field("did", &self.did).finish()
    }
}

impl LocalWallet {
    pub fn new(seed: &str, did: impl Into<String>) -> Self {
        Self {
            did: did.into(),
            key: blake3::derive_key(KEY_CONTEXT, seed.as_bytes()),
        }
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    fn nonce() -> String {
        let bytes: [u8; 16] = rand::random();
        URL_SAFE_NO_PAD.encode(bytes)
    }

    fn encode(&self, payload: &Payload) -> Result<String, WalletError> {
        let json = serde_json::to_vec(payload).map_err(|e| WalletError::Malformed(e.to_string()))?;
        let body = URL_SAFE_NO_PAD.encode(json);
        let mac = blake3::keyed_hash(&self.key, body.as_bytes());
        Ok(format!("{}.{}", body, URL_SAFE_NO_PAD.encode(mac.as_bytes())))
    }

    fn decode(&self, token: &str) -> Result<Payload, WalletError> {
        let (body, mac) = token
            .split_once('.')
            .ok_or_else(|| WalletError::Malformed("missing signature".to_string()))?;

        let mac = URL_SAFE_NO_PAD
            .decode(mac)
            .map_err(|e| WalletError::Malformed(e.to_string()))?;
        let mac = <[u8; 32]>::try_from(mac.as_slice())
            .map_err(|_| WalletError::Malformed("signature length".to_string()))?;

        // blake3::Hash equality is constant time
        if blake3::keyed_hash(&self.key, body.as_bytes()) != blake3::Hash::from(mac) {
            return Err(WalletError::InvalidCredential(
                "signature does not verify".to_string(),
            ));
        }

        let json = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|e| WalletError::Malformed(e.to_string()))?;
        serde_json::from_slice(&json).map_err(|e| WalletError::Malformed(e.to_string()))
    }

    /// Answer a credential request the way a mobile wallet would
    pub fn respond(
        &self,
        request: &str,
        responder_did: &str,
        claims: ClaimSet,
    ) -> Result<String, WalletError> {
        let Payload::CredentialRequest {
            nonce, requirements, ..
        } = self.decode(request)?
        else {
            return Err(WalletError::Malformed("not a credential request".to_string()));
        };

        let credential_types = requirements
            .iter()
            .filter_map(|r| r.credential_type.last().cloned())
            .collect();

        self.encode(&Payload::CredentialResponse {
            iss: responder_did.to_string(),
            request_nonce: nonce,
            credential_types,
            claims,
        })
    }

    /// Accept a credential offer the way a mobile wallet would
    pub fn accept_offer(&self, offer: &str, responder_did: &str) -> Result<String, WalletError> {
        let Payload::CredentialOffer { nonce, .. } = self.decode(offer)? else {
            return Err(WalletError::Malformed("not a credential offer".to_string()));
        };
        self.encode(&Payload::CredentialOfferResponse {
            iss: responder_did.to_string(),
            offer_nonce: nonce,
        })
    }

    /// Subject DID of a credential this wallet signed
    pub fn credential_subject(&self, credential: &str) -> Result<String, WalletError> {
        match self.decode(credential)? {
            Payload::SignedCredential { sub, .. } => Ok(sub),
            _ => Err(WalletError::Malformed("not a signed credential".to_string())),
        }
    }
}

#[async_trait]
impl CredentialExchange for LocalWallet {
    async fn create_auth_request(
        &self,
        callback_url: &str,
        requirements: &[CredentialRequirement],
    ) -> WalletResult<AuthRequest> {
        let nonce = Self::nonce();
        let encoded = self.encode(&Payload::CredentialRequest {
            iss: self.did.clone(),
            nonce: nonce.clone(),
            callback_url: callback_url.to_string(),
            requirements: requirements.to_vec(),
            iat: chrono::Utc::now().timestamp(),
        })?;
        Ok(AuthRequest { encoded, nonce })
    }

    async fn create_credential_offer(&self, callback_url: &str) -> WalletResult<String> {
        self.encode(&Payload::CredentialOffer {
            iss: self.did.clone(),
            nonce: Self::nonce(),
            callback_url: callback_url.to_string(),
            iat: chrono::Utc::now().timestamp(),
        })
    }

    async fn validate_response(
        &self,
        response: &str,
        original_request: &str,
    ) -> WalletResult<VerifiedResponse> {
        let Payload::CredentialRequest {
            nonce,
            requirements,
            ..
        } = self.decode(original_request)?
        else {
            return Err(WalletError::Malformed("stored token is not a request".to_string()));
        };

        let Payload::CredentialResponse {
            iss,
            request_nonce,
            credential_types,
            claims,
        } = self.decode(response)?
        else {
            return Err(WalletError::InvalidCredential(
                "token is not a credential response".to_string(),
            ));
        };

        if request_nonce != nonce {
            return Err(WalletError::InvalidCredential(
                "response answers a different request".to_string(),
            ));
        }

        if let Some(missing) = requirements
            .iter()
            .filter_map(|r| r.credential_type.last())
            .find(|t| !credential_types.contains(t))
        {
            return Err(WalletError::InvalidCredential(format!(
                "missing credential {}",
                missing
            )));
        }

        Ok(VerifiedResponse {
            issuer_did: iss,
            claims,
        })
    }

    async fn validate_offer_response(&self, response: &str) -> WalletResult<String> {
        match self.decode(response)? {
            Payload::CredentialOfferResponse { iss, .. } => Ok(iss),
            _ => Err(WalletError::InvalidCredential(
                "token is not an offer response".to_string(),
            )),
        }
    }

    async fn issue_credential(
        &self,
        subject_did: &str,
        claim: ClaimSet,
        metadata: CredentialMetadata,
    ) -> WalletResult<String> {
        self.encode(&Payload::SignedCredential {
            iss: self.did.clone(),
            sub: subject_did.to_string(),
            claim,
            metadata,
            iat: chrono::Utc::now().timestamp(),
        })
    }
}
